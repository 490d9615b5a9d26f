//! # Configuration Management
//!
//! Loads the bridge configuration from several layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` next to the binary
//! - Environment variables with the `APP_` prefix (`__` separates nested keys)
//! - Well-known deployment variables (`HOST`, `PORT`, `DEEPGRAM_API_KEY`, `TWILIO_*`)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`PORT=3000`, `DEEPGRAM_API_KEY=...`)
//! 2. Prefixed environment variables (`APP_AUDIO__SAMPLE_RATE=8000`)
//! 3. Configuration file (`config.toml`)
//! 4. Default values

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration.
///
/// ## Why separate config structs:
/// Each section maps to one concern of the bridge (HTTP server, agent backend,
/// audio framing, session behaviour, telephony provider), so a deployment can
/// override a single section without touching the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub bridge: BridgeConfig,
    pub telephony: TelephonyConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Voice-agent backend settings.
///
/// ## Fields:
/// - `url`: WebSocket endpoint of the conversational agent
/// - `api_key`: Credential sent in the `Sec-WebSocket-Protocol` header
/// - `settings_path`: JSON template sent as the first message of every session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub url: String,
    pub api_key: String,
    pub settings_path: String,
}

/// Inbound audio framing.
///
/// Telephony media arrives as small packets (20ms of 8kHz mu-law = 160 bytes).
/// The agent receives larger frames made of `packets_per_frame` packets.
///
/// ## Frame size:
/// `sample_rate * packet_duration_ms / 1000 * packets_per_frame` bytes, one byte
/// per mu-law sample. The defaults give 160 * 20 = 3200 bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub packet_duration_ms: u32,
    pub packets_per_frame: u32,
    /// Capacity of the frame channel between capture and forwarder.
    /// A full channel suspends the capture loop until the forwarder catches up.
    pub queue_capacity: usize,
}

impl AudioConfig {
    /// Bytes in one telephony packet.
    pub fn packet_size(&self) -> usize {
        (self.sample_rate as usize * self.packet_duration_ms as usize) / 1000
    }

    /// Bytes in one frame forwarded to the agent.
    pub fn frame_size(&self) -> usize {
        self.packet_size() * self.packets_per_frame as usize
    }
}

/// Per-session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long finalize waits for trailing agent audio before hanging up.
    pub finalize_grace_ms: u64,
    /// Telephony read idle timeout in seconds. Media packets arrive every
    /// 20ms while a call is live. `0` disables the timeout.
    pub telephony_idle_timeout_secs: u64,
    /// Agent read idle timeout in seconds. The agent is silent while the
    /// candidate talks, so this is much longer. `0` disables the timeout.
    pub agent_idle_timeout_secs: u64,
    /// Telephony messages queued between the websocket actor and the session.
    /// A call whose queue overflows is closed.
    pub telephony_queue_capacity: usize,
}

impl BridgeConfig {
    pub fn finalize_grace(&self) -> Duration {
        Duration::from_millis(self.finalize_grace_ms)
    }

    pub fn telephony_idle_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.telephony_idle_timeout_secs)
    }

    pub fn agent_idle_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.agent_idle_timeout_secs)
    }
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Telephony provider (Twilio) settings.
///
/// ## Fields:
/// - `webhook_url`: URL the provider fetches when the callee answers
/// - `stream_url`: Public `wss://` base URL of this server's `/ws` endpoint,
///   used when answering that webhook with TwiML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub webhook_url: String,
    pub stream_url: String,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of bridged calls handled at the same time
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            agent: AgentConfig {
                url: "wss://agent.deepgram.com/v1/agent/converse".to_string(),
                api_key: String::new(),
                settings_path: "config.json".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 8000,
                packet_duration_ms: 20,
                packets_per_frame: 20,
                queue_capacity: 64,
            },
            bridge: BridgeConfig {
                finalize_grace_ms: 2000,
                telephony_idle_timeout_secs: 120,
                agent_idle_timeout_secs: 900,
                telephony_queue_capacity: 256,
            },
            telephony: TelephonyConfig {
                api_base: "https://api.twilio.com".to_string(),
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: String::new(),
                webhook_url: String::new(),
                stream_url: String::new(),
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 50,
            },
        }
    }
}

/// Deployment variables that don't follow the `APP_` convention, mapped to
/// the config key they override.
const DEPLOYMENT_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("DEEPGRAM_API_KEY", "agent.api_key"),
    ("TWILIO_ACCOUNT_SID", "telephony.account_sid"),
    ("TWILIO_AUTH_TOKEN", "telephony.auth_token"),
    ("TWILIO_PHONE_NUMBER", "telephony.from_number"),
    ("TWILIO_WEBHOOK_URL", "telephony.webhook_url"),
    ("TWILIO_STREAM_URL", "telephony.stream_url"),
];

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_BRIDGE__FINALIZE_GRACE_MS=500`: Shorter hang-up grace period
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::new("config.toml", config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in DEPLOYMENT_OVERRIDES {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(*key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Credentials are not checked here: the agent API key is enforced when the
    /// agent connector is built, and telephony credentials only matter for
    /// outbound calls.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.agent.url.trim().is_empty() {
            return Err(anyhow::anyhow!("Agent URL must not be empty"));
        }

        if self.audio.sample_rate == 0
            || self.audio.packet_duration_ms == 0
            || self.audio.packets_per_frame == 0
        {
            return Err(anyhow::anyhow!(
                "Audio sample rate, packet duration and packets per frame must be greater than 0"
            ));
        }

        if self.audio.frame_size() == 0 {
            return Err(anyhow::anyhow!("Audio frame size must be greater than 0"));
        }

        if self.audio.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Audio queue capacity must be greater than 0"));
        }

        if self.bridge.telephony_queue_capacity == 0 {
            return Err(anyhow::anyhow!("Telephony queue capacity must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_frame_size() {
        let config = AppConfig::default();
        assert_eq!(config.audio.packet_size(), 160);
        assert_eq!(config.audio.frame_size(), 3200);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.packets_per_frame = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bridge.telephony_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_idle_timeout_disabled_at_zero() {
        let mut config = AppConfig::default();
        assert_eq!(config.bridge.telephony_idle_timeout(), Some(Duration::from_secs(120)));
        config.bridge.telephony_idle_timeout_secs = 0;
        assert_eq!(config.bridge.telephony_idle_timeout(), None);
        config.bridge.agent_idle_timeout_secs = 0;
        assert_eq!(config.bridge.agent_idle_timeout(), None);
        assert_eq!(config.bridge.finalize_grace(), Duration::from_secs(2));
    }

    #[test]
    fn test_agent_idle_timeout_outlasts_long_answers() {
        let config = AppConfig::default();
        let telephony = config.bridge.telephony_idle_timeout().unwrap();
        let agent = config.bridge.agent_idle_timeout().unwrap();
        assert!(agent >= Duration::from_secs(600));
        assert!(agent > telephony);
    }
}
