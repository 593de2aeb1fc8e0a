//! Host capabilities consumed by the widget
//!
//! Both are untrusted: their errors are caught at the call site and turned into widget
//! state, never propagated out of a public operation.

#![warn(clippy::all, rust_2018_idioms)]

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Language-model completion supplied by the host
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, returning the raw generator output
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Network GET supplied by the host
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Fetch `url` and decode the body as JSON
    async fn fetch(&self, url: &str) -> anyhow::Result<Value>;
}

/// [`CompletionProvider`] backed by an async closure
pub struct FnCompletion<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> CompletionProvider for FnCompletion<F, Fut>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        (self.func)(prompt.to_string()).await
    }
}

/// [`DataFetcher`] backed by an async closure
pub struct FnFetcher<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> DataFetcher for FnFetcher<F, Fut>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn fetch(&self, url: &str) -> anyhow::Result<Value> {
        (self.func)(url.to_string()).await
    }
}

/// Wrap an async closure as a completion provider
pub fn completion_fn<F, Fut>(func: F) -> Arc<dyn CompletionProvider>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(FnCompletion {
        func,
        _marker: PhantomData,
    })
}

/// Wrap an async closure as a data fetcher
pub fn fetcher_fn<F, Fut>(func: F) -> Arc<dyn DataFetcher>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnFetcher {
        func,
        _marker: PhantomData,
    })
}
