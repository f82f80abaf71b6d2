//! Viewer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use camrx_core::{MAX_UDP_PAYLOAD, ProtocolVariant, ReceiverConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Receive socket and protocol.
    pub network: NetworkConfig,
    /// What happens to received frames and poses.
    pub consumer: ConsumerConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port to listen on (all interfaces).
    pub listen_port: u16,
    /// Longest single socket wait in milliseconds.
    pub socket_timeout_ms: u64,
    /// Incomplete frames are dropped after this many milliseconds.
    pub frame_timeout_ms: u64,
    /// Receive buffer size in bytes.
    pub max_datagram_size: usize,
    /// Shutdown wait for the receive task in milliseconds.
    pub join_timeout_ms: u64,
    /// "calibrated" or "position-only".
    pub protocol: ProtocolVariant,
}

/// Consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// How often the consumer looks for new state.
    pub poll_interval_ms: u64,
    /// Write each new frame here. Empty disables.
    pub frame_output: String,
    /// Log every pose update.
    pub log_pose: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 7400,
            socket_timeout_ms: 100,
            frame_timeout_ms: 250,
            max_datagram_size: MAX_UDP_PAYLOAD,
            join_timeout_ms: 500,
            protocol: ProtocolVariant::Calibrated,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            frame_output: String::new(),
            log_pose: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Build the core receiver config. Durations are clamped to at least 1 ms.
    pub fn to_receiver_config(&self) -> ReceiverConfig {
        let ms = |v: u64| Duration::from_millis(v.max(1));
        ReceiverConfig {
            port: self.network.listen_port,
            socket_timeout: ms(self.network.socket_timeout_ms),
            frame_timeout: ms(self.network.frame_timeout_ms),
            join_timeout: ms(self.network.join_timeout_ms),
            max_datagram_size: self.network.max_datagram_size.clamp(64, MAX_UDP_PAYLOAD),
            variant: self.network.protocol,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.poll_interval_ms.max(1))
    }

    /// Frame output path, if configured.
    pub fn frame_output(&self) -> Option<PathBuf> {
        let path = self.consumer.frame_output.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

// ── Tests ────────────────────────────────────────────────────────
