//! ASR (speech-to-text) Service client (§6)
//!
//! A single attempt per call, no retries (Design Notes: "Retries live only
//! in the Synthesizer Driver"). A failed transcription simply drops the
//! turn — the user will speak again.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use voice_agent_core::session::SessionCredentials;
use voice_agent_core::AudioFrame;

use crate::{check_status, TransportError};

#[async_trait]
pub trait AsrService: Send + Sync {
    async fn transcribe(
        &self,
        credentials: &SessionCredentials,
        audio: &[AudioFrame],
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

pub struct HttpAsrClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAsrClient {
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
impl AsrService for HttpAsrClient {
    async fn transcribe(
        &self,
        credentials: &SessionCredentials,
        audio: &[AudioFrame],
    ) -> Result<String, TransportError> {
        let pcm: Vec<u8> = audio.iter().flat_map(|frame| frame.to_pcm16()).collect();

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .bearer_auth(&credentials.session_secret)
            .header("x-session-id", credentials.session_id.to_string())
            .body(pcm)
            .send()
            .await
            .map_err(|e| TransportError::Transcription(e.to_string()))?;

        let response = check_status(response, TransportError::Transcription)?;

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Transcription(e.to_string()))?;
        Ok(body.text)
    }
}
