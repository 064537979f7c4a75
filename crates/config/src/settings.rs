//! Main settings module
//!
//! Layered load order (highest priority last): built-in defaults, then
//! `config/default.yaml`, then `config/{env}.yaml`, then `VOICE_AGENT_`
//! environment variables. Mirrors the loading order teams already expect
//! from the `config` crate's `Config::builder()`.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment: affects only how strictly [`Settings::validate`]
/// treats missing/out-of-range values, never runtime behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Root settings for one voice-agent runtime process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub vad: VadConfig,

    #[serde(default)]
    pub capture_queue: CaptureQueueConfig,

    #[serde(default)]
    pub barge_in: BargeInConfig,

    #[serde(default)]
    pub synthesizer: SynthesizerConfig,

    #[serde(default)]
    pub keep_alive: KeepAliveConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_vad()?;
        self.validate_capture_queue()?;
        self.validate_barge_in()?;
        self.validate_synthesizer()?;
        self.validate_keep_alive()?;
        self.validate_transport()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "Max connections must be at least 1".to_string(),
            });
        }

        if self.environment.is_production() && self.server.cors_enabled && self.server.cors_origins.is_empty() {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured; \
                 this may block legitimate UI Shell connections"
            );
        }

        Ok(())
    }

    fn validate_vad(&self) -> Result<(), ConfigError> {
        let vad = &self.vad;

        if vad.stop_threshold_db >= vad.start_threshold_db {
            return Err(ConfigError::InvalidValue {
                field: "vad.stop_threshold_db".to_string(),
                message: format!(
                    "Must be below start_threshold_db ({} >= {})",
                    vad.stop_threshold_db, vad.start_threshold_db
                ),
            });
        }

        if vad.min_speech_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.min_speech_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }

        if vad.max_gap_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.max_gap_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }

        Ok(())
    }

    fn validate_capture_queue(&self) -> Result<(), ConfigError> {
        if self.capture_queue.max_queued_blobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture_queue.max_queued_blobs".to_string(),
                message: "Bound N must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_barge_in(&self) -> Result<(), ConfigError> {
        if self.barge_in.min_interrupt_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "barge_in.min_interrupt_chars".to_string(),
                message: "Must be at least 1 character".to_string(),
            });
        }
        Ok(())
    }

    fn validate_synthesizer(&self) -> Result<(), ConfigError> {
        let s = &self.synthesizer;

        if s.max_retries_per_segment == 0 {
            tracing::warn!("synthesizer.max_retries_per_segment is 0 — segments fail on first TTS error");
        }

        if s.max_backoff_ms < s.base_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "synthesizer.max_backoff_ms".to_string(),
                message: "Must be at least base_backoff_ms".to_string(),
            });
        }

        if s.short_segment_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "synthesizer.short_segment_chars".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_keep_alive(&self) -> Result<(), ConfigError> {
        if self.keep_alive.silence_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keep_alive.silence_window_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }
        Ok(())
    }

    fn validate_transport(&self) -> Result<(), ConfigError> {
        let t = &self.transport;
        for (field, timeout) in [
            ("transport.asr_timeout_ms", t.asr_timeout_ms),
            ("transport.generator_timeout_ms", t.generator_timeout_ms),
            ("transport.tts_timeout_ms", t.tts_timeout_ms),
            ("transport.session_timeout_ms", t.session_timeout_ms),
        ] {
            if timeout == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Timeout must be at least 1ms".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// UI Shell-facing WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws/session".to_string()
}
fn default_max_connections() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Hysteresis thresholds for the Voice Activity Detector (§4.1). The shape
/// (two thresholds, a min-duration floor, a max-gap timeout) is fixed by
/// design; these are the tuned numeric values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    /// Smoothed level above which speech is considered to have started (dBFS).
    #[serde(default = "default_start_threshold_db")]
    pub start_threshold_db: f32,

    /// Smoothed level below which speech is considered to have ended (dBFS).
    /// Must be strictly lower than `start_threshold_db` (hysteresis gap).
    #[serde(default = "default_stop_threshold_db")]
    pub stop_threshold_db: f32,

    /// Minimum utterance duration to avoid discarding it as noise.
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u32,

    /// How long the level must stay at or below `stop_threshold_db` before
    /// speech is considered ended.
    #[serde(default = "default_max_gap_ms")]
    pub max_gap_ms: u32,

    /// Length of the moving-average smoothing window, in frames.
    #[serde(default = "default_smoothing_frames")]
    pub smoothing_frames: usize,
}

fn default_start_threshold_db() -> f32 {
    -35.0
}
fn default_stop_threshold_db() -> f32 {
    -45.0
}
fn default_min_speech_ms() -> u32 {
    200
}
fn default_max_gap_ms() -> u32 {
    300
}
fn default_smoothing_frames() -> usize {
    5
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            start_threshold_db: default_start_threshold_db(),
            stop_threshold_db: default_stop_threshold_db(),
            min_speech_ms: default_min_speech_ms(),
            max_gap_ms: default_max_gap_ms(),
            smoothing_frames: default_smoothing_frames(),
        }
    }
}

/// Capture Queue bound (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureQueueConfig {
    /// `N` — maximum number of captured blobs retained; on overflow only the
    /// newest is kept (coalesce policy).
    #[serde(default = "default_max_queued_blobs")]
    pub max_queued_blobs: usize,
}

fn default_max_queued_blobs() -> usize {
    2
}

impl Default for CaptureQueueConfig {
    fn default() -> Self {
        Self {
            max_queued_blobs: default_max_queued_blobs(),
        }
    }
}

/// Word-based barge-in thresholds (§4.6, Invariant T3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BargeInConfig {
    /// Transcribed character count that triggers invalidation of a turn in
    /// Synthesizing or Playing.
    #[serde(default = "default_min_interrupt_chars")]
    pub min_interrupt_chars: usize,
}

fn default_min_interrupt_chars() -> usize {
    3
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            min_interrupt_chars: default_min_interrupt_chars(),
        }
    }
}

/// Pause-Aware Synthesizer Driver tuning (§4.5, §4.5.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Maximum TTS retries per segment before it is skipped.
    #[serde(default = "default_max_retries_per_segment")]
    pub max_retries_per_segment: u32,

    /// Base exponential-backoff delay between TTS retries.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff cap; the exponential delay never exceeds this value.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Length below which a segment is considered "short" for pause
    /// adjustment.
    #[serde(default = "default_short_segment_chars")]
    pub short_segment_chars: usize,

    /// Pause-adjustment scale factor applied when both neighboring segments
    /// are short and neither carries a transition marker.
    #[serde(default = "default_pause_scale_factor")]
    pub pause_scale_factor: f64,

    /// Floor below which an adjusted pause is never scaled.
    #[serde(default = "default_min_adjusted_pause_ms")]
    pub min_adjusted_pause_ms: u64,
}

fn default_max_retries_per_segment() -> u32 {
    2
}
fn default_base_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    800
}
fn default_short_segment_chars() -> usize {
    40
}
fn default_pause_scale_factor() -> f64 {
    0.5
}
fn default_min_adjusted_pause_ms() -> u64 {
    150
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            max_retries_per_segment: default_max_retries_per_segment(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            short_segment_chars: default_short_segment_chars(),
            pause_scale_factor: default_pause_scale_factor(),
            min_adjusted_pause_ms: default_min_adjusted_pause_ms(),
        }
    }
}

/// Keep-Alive Scheduler tuning (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// `silenceWindow` — idle duration after which a proactive turn fires.
    #[serde(default = "default_silence_window_ms")]
    pub silence_window_ms: u64,
}

fn default_silence_window_ms() -> u64 {
    30_000
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            silence_window_ms: default_silence_window_ms(),
        }
    }
}

/// External service endpoints and per-call timeouts (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_session_service_url")]
    pub session_service_url: String,
    #[serde(default = "default_asr_service_url")]
    pub asr_service_url: String,
    #[serde(default = "default_generator_service_url")]
    pub generator_service_url: String,
    #[serde(default = "default_tts_service_url")]
    pub tts_service_url: String,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_asr_timeout_ms")]
    pub asr_timeout_ms: u64,
    #[serde(default = "default_generator_timeout_ms")]
    pub generator_timeout_ms: u64,
    #[serde(default = "default_tts_timeout_ms")]
    pub tts_timeout_ms: u64,
}

fn default_session_service_url() -> String {
    "http://localhost:4001".to_string()
}
fn default_asr_service_url() -> String {
    "http://localhost:4002".to_string()
}
fn default_generator_service_url() -> String {
    "http://localhost:4003".to_string()
}
fn default_tts_service_url() -> String {
    "http://localhost:4004".to_string()
}
fn default_session_timeout_ms() -> u64 {
    5_000
}
fn default_asr_timeout_ms() -> u64 {
    10_000
}
fn default_generator_timeout_ms() -> u64 {
    15_000
}
fn default_tts_timeout_ms() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session_service_url: default_session_service_url(),
            asr_service_url: default_asr_service_url(),
            generator_service_url: default_generator_service_url(),
            tts_service_url: default_tts_service_url(),
            session_timeout_ms: default_session_timeout_ms(),
            asr_timeout_ms: default_asr_timeout_ms(),
            generator_timeout_ms: default_generator_timeout_ms(),
            tts_timeout_ms: default_tts_timeout_ms(),
        }
    }
}

/// Structured logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VOICE_AGENT_` prefix, `__` nested separator)
/// 2. `config/{env}.yaml` (if `env` is given)
/// 3. `config/default.yaml`
/// 4. Built-in defaults above
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
