//! Application State
//!
//! Holds the one thing every handler needs: the loaded configuration, plus
//! factory methods for the four external service clients (§6). Per-connection
//! state (the running [`voice_agent_orchestrator::Session`] and its audio
//! bridge) is built fresh by the WebSocket handler on each upgrade; this
//! crate is a thin UI Shell boundary, not a session store (§6.1).

use std::sync::Arc;
use std::time::Duration;

use voice_agent_config::Settings;
use voice_agent_transport::{HttpAsrClient, HttpGeneratorClient, HttpSessionClient, HttpTtsClient};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn session_client(&self) -> Arc<HttpSessionClient> {
        Arc::new(HttpSessionClient::new(
            self.settings.transport.session_service_url.clone(),
            Duration::from_millis(self.settings.transport.session_timeout_ms),
        ))
    }

    pub fn asr_client(&self) -> Arc<HttpAsrClient> {
        Arc::new(HttpAsrClient::new(
            self.settings.transport.asr_service_url.clone(),
            Duration::from_millis(self.settings.transport.asr_timeout_ms),
        ))
    }

    pub fn generator_client(&self) -> Arc<HttpGeneratorClient> {
        Arc::new(HttpGeneratorClient::new(
            self.settings.transport.generator_service_url.clone(),
            Duration::from_millis(self.settings.transport.generator_timeout_ms),
        ))
    }

    pub fn tts_client(&self) -> Arc<HttpTtsClient> {
        Arc::new(HttpTtsClient::new(
            self.settings.transport.tts_service_url.clone(),
            Duration::from_millis(self.settings.transport.tts_timeout_ms),
        ))
    }
}
