//! HTTP client for the mc-router management API.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{header, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{RouterClient, Routes};
use crate::error::ManagerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteBody<'a> {
    server_address: &'a str,
    backend: &'a str,
}

/// mc-router API client.
#[derive(Clone)]
pub struct McRouterClient {
    http: reqwest::Client,
    base_url: Url,
}

impl McRouterClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ManagerError> {
        let base_url = parse_base_url(base_url)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, ManagerError> {
        self.base_url
            .join(path)
            .map_err(|e| ManagerError::Config(format!("invalid router path {path}: {e}")))
    }

    async fn delete_route(&self, fqdn: &str) -> Result<(), ManagerError> {
        let url = self.url(&format!("routes/{fqdn}"))?;
        let response = self.http.delete(url.clone()).send().await?;
        ensure_success(&url, response.status())
    }

    async fn add_route(&self, fqdn: &str, backend: &str) -> Result<(), ManagerError> {
        let url = self.url("routes")?;
        let response = self
            .http
            .post(url.clone())
            .json(&RouteBody {
                server_address: fqdn,
                backend,
            })
            .send()
            .await?;
        ensure_success(&url, response.status())
    }
}

/// Parse a base URL, making sure relative joins append to its path.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ManagerError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ManagerError::Config(format!("invalid base url {base_url}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn ensure_success(url: &Url, status: reqwest::StatusCode) -> Result<(), ManagerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ManagerError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl RouterClient for McRouterClient {
    async fn get_routes(&self) -> Result<Routes, ManagerError> {
        let url = self.url("routes")?;
        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        ensure_success(&url, response.status())?;
        Ok(response.json().await?)
    }

    async fn override_routes(&self, routes: &Routes) -> Result<(), ManagerError> {
        let existing = self.get_routes().await?;
        debug!(existing = existing.len(), new = routes.len(), "replacing routes");

        try_join_all(existing.keys().map(|fqdn| self.delete_route(fqdn))).await?;
        try_join_all(
            routes
                .iter()
                .map(|(fqdn, backend)| self.add_route(fqdn, backend)),
        )
        .await?;
        Ok(())
    }
}
