//! Generator Service client (§6)
//!
//! Produces the agent's reply text, including pause tokens. The `context`
//! bag is opaque here — it is whatever [`voice_agent_core::Transcript::recent_lines`]
//! produced — and `proactive` flags Keep-Alive-Scheduler-initiated turns so
//! the Generator can tailor tone accordingly.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use voice_agent_core::session::SessionCredentials;

use crate::{check_status, TransportError};

#[async_trait]
pub trait GeneratorService: Send + Sync {
    async fn generate(
        &self,
        credentials: &SessionCredentials,
        context: &[String],
        input: &str,
        proactive: bool,
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    context: &'a [String],
    input: &'a str,
    proactive: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    reply: String,
}

pub struct HttpGeneratorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeneratorClient {
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
impl GeneratorService for HttpGeneratorClient {
    async fn generate(
        &self,
        credentials: &SessionCredentials,
        context: &[String],
        input: &str,
        proactive: bool,
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .bearer_auth(&credentials.session_secret)
            .header("x-session-id", credentials.session_id.to_string())
            .json(&GenerateRequest {
                context,
                input,
                proactive,
            })
            .send()
            .await
            .map_err(|e| TransportError::Generation(e.to_string()))?;

        let response = check_status(response, TransportError::Generation)?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Generation(e.to_string()))?;
        Ok(body.reply)
    }
}
