//! Session Service client (§6)
//!
//! Mints and tears down session credentials. The Orchestrator forwards the
//! resulting [`SessionCredentials`] verbatim to every other external call.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use voice_agent_core::session::{SessionCredentials, SessionId};

use crate::{check_status, TransportError};

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create_session(&self) -> Result<SessionCredentials, TransportError>;
    async fn end_session(&self, credentials: &SessionCredentials) -> Result<(), TransportError>;
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    session_secret: String,
}

pub struct HttpSessionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SessionService for HttpSessionClient {
    async fn create_session(&self) -> Result<SessionCredentials, TransportError> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .send()
            .await
            .map_err(|e| TransportError::Session(e.to_string()))?;

        let response = check_status(response, TransportError::Session)?;

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Session(e.to_string()))?;
        Ok(SessionCredentials::new(
            SessionId(body.session_id),
            body.session_secret,
        ))
    }

    async fn end_session(&self, credentials: &SessionCredentials) -> Result<(), TransportError> {
        let response = self
            .client
            .delete(format!(
                "{}/sessions/{}",
                self.base_url, credentials.session_id
            ))
            .bearer_auth(&credentials.session_secret)
            .send()
            .await
            .map_err(|e| TransportError::Session(e.to_string()))?;

        check_status(response, TransportError::Session)?;
        Ok(())
    }
}
