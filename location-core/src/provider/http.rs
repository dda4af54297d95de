use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::LocationProvider;

/// Location provider backed by the hosted location-data REST service.
///
/// Endpoints, relative to the configured base URL:
/// - `GET /countries`
/// - `GET /country={country}/states`
/// - `GET /country={country}/state={state}/cities`
///
/// Each returns a JSON array of names; an empty array is a valid result.
#[derive(Debug, Clone)]
pub struct HttpLocationProvider {
    base: Url,
    http: Client,
}

impl HttpLocationProvider {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid location service URL: {base_url}"))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self { base, http })
    }

    fn countries_url(&self) -> Result<Url> {
        self.endpoint(&["countries"])
    }

    fn states_url(&self, country: &str) -> Result<Url> {
        self.endpoint(&[&format!("country={country}"), "states"])
    }

    fn cities_url(&self, country: &str, state: &str) -> Result<Url> {
        self.endpoint(&[&format!("country={country}"), &format!("state={state}"), "cities"])
    }

    /// Append `segments` to the base URL, percent-encoding each one. Names
    /// containing `/`, `%`, spaces or non-ASCII arrive at the service as a
    /// single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("Location service URL cannot carry a path: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_names(&self, url: Url) -> Result<Vec<String>> {
        debug!(%url, "requesting name list");

        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "Request to {} failed with status {}: {}",
                url,
                status,
                truncate_body(&body),
            ));
        }

        let names: Vec<String> = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse name list from {url}"))?;

        Ok(names)
    }
}

#[async_trait]
impl LocationProvider for HttpLocationProvider {
    async fn countries(&self) -> Result<Vec<String>> {
        self.fetch_names(self.countries_url()?).await
    }

    async fn states(&self, country: &str) -> Result<Vec<String>> {
        self.fetch_names(self.states_url(country)?).await
    }

    async fn cities(&self, country: &str, state: &str) -> Result<Vec<String>> {
        self.fetch_names(self.cities_url(country, state)?).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
