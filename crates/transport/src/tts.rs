//! TTS (text-to-speech) Service client (§6)
//!
//! Called per segment by the Pause-Aware Synthesizer Driver, which owns the
//! retry/backoff policy (§4.5). This client makes exactly one attempt; it
//! never retries internally.

use std::time::Duration;

use async_trait::async_trait;
use voice_agent_core::session::SessionCredentials;
use voice_agent_core::{AudioFrame, Channels, SampleRate};

use crate::{check_status, TransportError};

#[async_trait]
pub trait TtsService: Send + Sync {
    async fn synthesize(
        &self,
        credentials: &SessionCredentials,
        text: &str,
    ) -> Result<AudioFrame, TransportError>;
}

pub struct HttpTtsClient {
    client: reqwest::Client,
    base_url: String,
    output_rate: SampleRate,
}

impl HttpTtsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            output_rate: SampleRate::Hz22050,
        }
    }
}

#[async_trait]
impl TtsService for HttpTtsClient {
    async fn synthesize(
        &self,
        credentials: &SessionCredentials,
        text: &str,
    ) -> Result<AudioFrame, TransportError> {
        let response = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .bearer_auth(&credentials.session_secret)
            .header("x-session-id", credentials.session_id.to_string())
            .header("content-type", "text/plain")
            .body(text.to_string())
            .send()
            .await
            .map_err(|e| TransportError::Synthesis(e.to_string()))?;

        let response = check_status(response, TransportError::Synthesis)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Synthesis(e.to_string()))?;
        Ok(AudioFrame::from_pcm16(&bytes, self.output_rate, Channels::Mono, 0))
    }
}
