//! HTTP client side of the CLI: registry lookup, request plumbing, and the
//! error shape the exit-code mapping is built on.

use serde_json::Value;
use thiserror::Error;

use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Daemon is not running")]
    NotRunning,

    #[error("{message}")]
    Daemon { status: u16, message: String },

    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::NotRunning
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub struct DaemonClient {
    base: String,
    http: reqwest::Client,
}

impl DaemonClient {
    /// Resolve the named instance through the registry. A missing entry is
    /// the "daemon not running" case the CLI maps to exit 2.
    pub fn connect(registry: &Registry, name: &str) -> Result<Self, CliError> {
        let record = registry
            .lookup(name)
            .map_err(|e| CliError::Transport(e.to_string()))?
            .ok_or(CliError::NotRunning)?;
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(2))
            .build()
            .map_err(|e| CliError::Transport(e.to_string()))?;
        Ok(Self {
            base: format!("http://127.0.0.1:{}", record.port),
            http,
        })
    }

    pub fn for_port(port: u16) -> Self {
        Self {
            base: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
        }
    }

    async fn handle_json(response: reqwest::Response) -> Result<Value, CliError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CliError::Daemon {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| CliError::Transport(e.to_string()))
    }

    async fn handle_text(response: reqwest::Response) -> Result<String, CliError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CliError::Daemon {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, CliError> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .send()
            .await?;
        Self::handle_json(response).await
    }

    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, CliError> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .send()
            .await?;
        Self::handle_text(response).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, CliError> {
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await?;
        Self::handle_json(response).await
    }

    pub async fn health(&self) -> bool {
        matches!(
            self.get_text("/health", &[]).await.as_deref(),
            Ok("ok")
        )
    }
}
