//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-user proxy listeners.
    pub proxy: ProxyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Subscription renewal schedule.
    pub renewal: RenewalConfig,

    /// External provisioning collaborator.
    pub provisioner: ProvisionerConfig,

    /// Publish endpoint (HTTP).
    pub publish: PublishConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener variant run on every user port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Plain SOCKS5 handshake.
    #[default]
    Socks5,
    /// AEAD-wrapped stream carrying a bare target address.
    Encrypted,
}

impl std::str::FromStr for ProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socks5" => Ok(ProxyMode::Socks5),
            "encrypted" => Ok(ProxyMode::Encrypted),
            other => Err(format!("unknown proxy mode '{}'", other)),
        }
    }
}

/// Proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host to bind every user port on (e.g., "0.0.0.0").
    pub bind_host: String,

    /// First user port; user `i` listens on `start_port + i`.
    pub start_port: u16,

    /// Number of user slots.
    pub users: usize,

    /// Listener variant.
    pub mode: ProxyMode,

    /// AEAD method for the encrypted variant.
    pub cipher: String,

    /// JSON file holding one credential per user.
    pub credentials_path: String,

    /// Maximum concurrent sessions per port (backpressure).
    pub max_connections: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            start_port: 51801,
            users: 2,
            mode: ProxyMode::Socks5,
            cipher: "AEAD_AES_256_GCM".to_string(),
            credentials_path: "/etc/gateway/credentials.json".to_string(),
            max_connections: 1024,
        }
    }
}

impl ProxyConfig {
    /// Listening port of the user at `index`.
    pub fn port_for(&self, index: usize) -> u16 {
        self.start_port.saturating_add(index as u16)
    }
}

/// Timeout configuration for per-connection operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the whole handshake exchange in seconds.
    pub handshake_secs: u64,

    /// Target connect timeout in seconds.
    pub connect_secs: u64,

    /// Relay idle timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            connect_secs: 10,
            idle_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

/// Renewal scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Run the renewal scheduler.
    pub enabled: bool,

    /// Sleep after a pass where every slot is populated.
    pub normal_interval_secs: u64,

    /// Sleep after a pass that left any slot empty.
    pub retry_interval_secs: u64,

    /// Delay between two slots within one pass.
    pub slot_spacing_secs: u64,

    /// External validity of a provisioned payload.
    pub credential_lifetime_secs: u64,

    /// Attempts per slot inside the provisioner.
    pub max_attempts: u32,

    /// Fixed pause between attempts in milliseconds.
    pub attempt_delay_ms: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normal_interval_secs: 20 * 3600,
            retry_interval_secs: 3600,
            slot_spacing_secs: 5,
            credential_lifetime_secs: 24 * 3600,
            max_attempts: 3,
            attempt_delay_ms: 1000,
        }
    }
}

/// Which provisioner implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    /// Fetch the payload over HTTP.
    Http,
    /// Never produce a payload.
    #[default]
    Disabled,
}

/// Provisioner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub kind: ProvisionerKind,

    /// URL template; `{user}` and `{index}` are substituted per slot.
    pub source_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            kind: ProvisionerKind::Disabled,
            source_url: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Publish endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishConfig {
    /// HTTP bind address (e.g., "0.0.0.0:51800").
    pub bind_address: String,

    /// Host advertised in generated client documents.
    pub advertise_host: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:51800".to_string(),
            advertise_host: "127.0.0.1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
