use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{Config, provider::http::HttpLocationProvider};

pub mod http;

/// Read-only source of location names.
///
/// One capability interface for all transports: the picker neither knows nor
/// cares whether names come over HTTP or from an in-memory fixture. Country
/// and state names are passed back verbatim, exactly as a previous call
/// returned them.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn countries(&self) -> anyhow::Result<Vec<String>>;

    async fn states(&self, country: &str) -> anyhow::Result<Vec<String>>;

    async fn cities(&self, country: &str, state: &str) -> anyhow::Result<Vec<String>>;
}

/// Construct the HTTP provider against the configured service endpoint.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn LocationProvider>> {
    let provider = HttpLocationProvider::new(config.service_url(), config.request_timeout())?;
    Ok(Arc::new(provider))
}
