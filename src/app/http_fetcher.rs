//! `reqwest`-backed [`DataFetcher`]
//!
//! Generated code asks for paths like `/api/users`; they are resolved against the base URL
//! the host configured. Absolute URLs pass through unchanged unless the fetcher is restricted
//! to its base origin.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::app::widget::DataFetcher;

/// Default per-request timeout, matching the bridge bound
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<Url>,
    same_origin_only: bool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: None,
            same_origin_only: false,
        })
    }

    /// Resolve relative URLs against `base_url`
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("Invalid base URL '{}'", base_url))?;
        self.base_url = Some(base);
        Ok(self)
    }

    /// Reject URLs that resolve outside the base URL's origin
    pub fn same_origin_only(mut self) -> Self {
        self.same_origin_only = true;
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Turn a URL requested by generated code into an absolute URL
    pub fn resolve(&self, url: &str) -> Result<Url> {
        let resolved = match (&self.base_url, Url::parse(url)) {
            (_, Ok(absolute)) => absolute,
            (Some(base), Err(url::ParseError::RelativeUrlWithoutBase)) => base
                .join(url)
                .with_context(|| format!("Cannot resolve '{}' against {}", url, base))?,
            (None, Err(url::ParseError::RelativeUrlWithoutBase)) => {
                bail!("Relative URL '{}' requires a base URL", url)
            }
            (_, Err(e)) => return Err(anyhow!("Invalid URL '{}': {}", url, e)),
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            bail!("Unsupported URL scheme '{}'", resolved.scheme());
        }
        if self.same_origin_only {
            if let Some(base) = &self.base_url {
                if base.origin() != resolved.origin() {
                    bail!("URL '{}' is outside {}", url, base.origin().ascii_serialization());
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl DataFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Value> {
        let resolved = self.resolve(url)?;
        trace_debug!("GET {}", resolved);

        let response = self
            .client
            .get(resolved.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, url);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| anyhow!("Invalid JSON from {}: {}", url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base: &str) -> HttpFetcher {
        HttpFetcher::new().unwrap().with_base_url(base).unwrap()
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let fetcher = fetcher("http://localhost:8080/");
        assert_eq!(
            fetcher.resolve("/api/users?limit=5").unwrap().as_str(),
            "http://localhost:8080/api/users?limit=5"
        );
        assert_eq!(
            fetcher.resolve("api/orders").unwrap().as_str(),
            "http://localhost:8080/api/orders"
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let fetcher = fetcher("http://localhost:8080");
        assert_eq!(
            fetcher.resolve("https://example.com/data.json").unwrap().as_str(),
            "https://example.com/data.json"
        );
    }

    #[test]
    fn test_same_origin_restriction() {
        let fetcher = fetcher("http://localhost:8080").same_origin_only();
        assert!(fetcher.resolve("/api/x").is_ok());
        assert!(fetcher.resolve("https://example.com/x").is_err());
    }

    #[test]
    fn test_relative_without_base_and_bad_schemes_fail() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(fetcher.resolve("/api/x").is_err());
        assert!(fetcher.resolve("file:///etc/passwd").is_err());
        assert!(HttpFetcher::new().unwrap().with_base_url("not a url").is_err());
    }
}
