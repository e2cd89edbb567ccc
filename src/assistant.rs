use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::{Mode, Source};

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Body returned by the chat service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    mode: Option<String>,
}

impl ChatReply {
    /// Answer mode, falling back to community for missing or unknown values
    pub fn mode(&self) -> Mode {
        self.mode
            .as_deref()
            .and_then(Mode::parse)
            .unwrap_or_default()
    }
}

/// Anything that kept a request from producing a readable reply
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach assistant at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("assistant returned HTTP {0} with an unreadable body")]
    Status(StatusCode),
    #[error("assistant response was not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("assistant request did not complete: {0}")]
    Interrupted(String),
}

#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    endpoint: String,
}

impl AssistantClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Build a client whose requests give up after `timeout`.
    pub fn with_timeout(endpoint: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn ask(&self, message: &str) -> Result<ChatReply, TransportError> {
        let unreachable = |source: reqwest::Error| TransportError::Unreachable {
            endpoint: self.endpoint.clone(),
            source,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { message })
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        let body = response.text().await.map_err(unreachable)?;
        debug!(%status, bytes = body.len(), "assistant responded");

        // Error statuses may still carry a `{ success: false }` body, which is
        // an application-level answer rather than a transport failure.
        match serde_json::from_str::<ChatReply>(&body) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(TransportError::Status(status)),
            Err(err) => Err(err.into()),
        }
    }
}
