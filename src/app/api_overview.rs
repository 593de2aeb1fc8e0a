//! Best-effort endpoint overview extracted from the API description
//!
//! The description stays opaque everywhere else; this only reads the OpenAPI-like
//! `paths -> method -> summary` shape for display. Anything else yields no overview.

#![warn(clippy::all, rust_2018_idioms)]

use serde::Serialize;
use serde_json::Value;

const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "patch", "delete", "head", "options", "trace",
];

/// One operation of the described API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    /// Upper-case HTTP method
    pub method: String,
    pub path: String,
    pub summary: Option<String>,
}

impl EndpointSummary {
    pub fn display_line(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{} {} - {}", self.method, self.path, summary),
            None => format!("{} {}", self.method, self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiOverview {
    /// `info.title`, when present
    pub title: Option<String>,
    /// Sorted by path, then by method order within a path
    pub endpoints: Vec<EndpointSummary>,
}

impl ApiOverview {
    /// Parse `description`; `None` if it is not JSON or has no `paths` object
    pub fn parse(description: &str) -> Option<Self> {
        let document: Value = serde_json::from_str(description).ok()?;
        let paths = document.get("paths")?.as_object()?;

        let mut endpoints = Vec::new();
        for (path, operations) in paths {
            let Some(operations) = operations.as_object() else {
                continue;
            };
            for method in HTTP_METHODS {
                let Some(operation) = operations.get(method) else {
                    continue;
                };
                let summary = operation
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                endpoints.push(EndpointSummary {
                    method: method.to_ascii_uppercase(),
                    path: path.clone(),
                    summary,
                });
            }
        }

        endpoints.sort_by(|a, b| a.path.cmp(&b.path));

        let title = document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self { title, endpoints })
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn to_display_lines(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(EndpointSummary::display_line)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_openapi_shape() {
        let description = r#"{
            "info": {"title": "Shop API"},
            "paths": {
                "/api/users": {
                    "get": {"summary": "List users"},
                    "post": {"summary": "Create user"},
                    "parameters": []
                },
                "/api/orders/{id}": {"delete": {}}
            }
        }"#;

        let overview = ApiOverview::parse(description).unwrap();
        assert_eq!(overview.title.as_deref(), Some("Shop API"));
        assert_eq!(
            overview.to_display_lines(),
            vec![
                "DELETE /api/orders/{id}".to_string(),
                "GET /api/users - List users".to_string(),
                "POST /api/users - Create user".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_json_or_missing_paths_yields_none() {
        assert!(ApiOverview::parse("GET /users returns a list of users").is_none());
        assert!(ApiOverview::parse(r#"{"openapi": "3.0.0"}"#).is_none());
        assert!(ApiOverview::parse(r#"{"paths": []}"#).is_none());
    }

    #[test]
    fn test_empty_paths_is_empty_overview() {
        let overview = ApiOverview::parse(r#"{"paths": {}}"#).unwrap();
        assert!(overview.is_empty());
    }
}
