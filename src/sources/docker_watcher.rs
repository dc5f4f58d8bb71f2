//! docker-watcher client: the live server set and its change feed.

use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::{listen_websocket, websocket_url, ChangeFeed, PendingEvents, ServerSource, REQUEST_TIMEOUT};
use crate::error::ManagerError;
use crate::router::client::{ensure_success, parse_base_url};
use crate::state::Servers;

/// Client for a docker-watcher instance.
#[derive(Clone)]
pub struct DockerWatcherClient {
    http: reqwest::Client,
    base_url: Url,
    ws_url: Url,
}

impl DockerWatcherClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ManagerError> {
        let base_url = parse_base_url(base_url)?;
        let ws_url = websocket_url(&base_url)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url,
            ws_url,
        })
    }
}

#[async_trait]
impl ServerSource for DockerWatcherClient {
    async fn get_servers(&self) -> Result<Servers, ManagerError> {
        let url = self
            .base_url
            .join("all_servers")
            .map_err(|e| ManagerError::Config(e.to_string()))?;
        let response = self.http.get(url.clone()).send().await?;
        ensure_success(&url, response.status())?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChangeFeed for DockerWatcherClient {
    fn name(&self) -> &'static str {
        "docker_watcher"
    }

    /// Every text frame is a change notification.
    async fn listen(&self, events: PendingEvents, cancel: CancellationToken) {
        listen_websocket(self.name(), &self.ws_url, &events, &cancel, |_| true).await;
    }
}
