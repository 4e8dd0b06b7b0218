pub mod catalog;
pub mod engine_client;
pub mod graph_builder;
pub mod integration_store;
pub mod integration_sync;
pub mod integrations;
pub mod node_cache;
pub mod oauth_flow;
pub mod oauth_state;
pub mod provider_config;
pub mod registry;
pub mod resources;
pub mod settings;
pub mod token_store;

#[cfg(test)]
pub mod test_support;

use std::future::Future;
use tracing::warn;

use crate::error::AppResult;

/// Await `fut`; on failure log `what` at warn level and return `default`.
pub async fn best_effort<T, F>(what: &str, fut: F, default: T) -> T
where
    F: Future<Output = AppResult<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            warn!("{} failed: {}", what, e);
            default
        }
    }
}
