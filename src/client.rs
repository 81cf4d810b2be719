//! HTTP client for a pom server.

use crate::schedule::Schedule;
use crate::start_time::StartTime;
use crate::state::Session;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Well inside the server's idle lifetime.
const KEEP_ALIVE_EVERY: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach pom server: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("invalid server URL '{0}'")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether the server answered at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct PomClient {
    base_url: String,
    http: reqwest::Client,
}

impl PomClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Register a new group.
    pub async fn create(
        &self,
        name: &str,
        start_time: &StartTime,
        schedule: &Schedule,
    ) -> Result<Session, ClientError> {
        let res = self
            .http
            .post(format!("{}/poms", self.base_url))
            .json(&json!({
                "name": name,
                "startTime": start_time,
                "schedule": schedule,
            }))
            .send()
            .await?;
        Self::session_from(res).await
    }

    /// Fetch a group, keeping it alive on the server.
    pub async fn fetch(&self, name: &str) -> Result<Session, ClientError> {
        let invalid = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url =
            reqwest::Url::parse(&format!("{}/poms/", self.base_url)).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(name);
        let res = self.http.get(url).send().await?;
        Self::session_from(res).await
    }

    async fn session_from(res: reqwest::Response) -> Result<Session, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<Session>().await?);
        }
        let message = match res.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Re-fetch a group periodically so the server does not sweep it while
/// this client is still following it.
pub fn spawn_keep_alive(client: Arc<PomClient>, name: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEP_ALIVE_EVERY);
        interval.tick().await;
        loop {
            interval.tick().await;
            match client.fetch(&name).await {
                Ok(_) => debug!(name = %name, "Refreshed group"),
                Err(e) => warn!(name = %name, "Group refresh failed: {e}"),
            }
        }
    })
}
