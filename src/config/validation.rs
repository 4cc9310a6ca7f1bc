//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports fit in 16 bits)
//! - Check that the refresh schedule outruns the credential lifetime
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, ProvisionerKind, ProxyMode};
use crate::crypto::CipherKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let proxy = &config.proxy;
    if proxy.users == 0 {
        errors.push(ValidationError::new("proxy.users", "must be at least 1"));
    }
    if proxy.start_port == 0 {
        errors.push(ValidationError::new("proxy.start_port", "must be non-zero"));
    }
    let last_port = (proxy.start_port as usize).saturating_add(proxy.users.saturating_sub(1));
    if last_port > u16::MAX as usize {
        errors.push(ValidationError::new(
            "proxy.users",
            format!("port range {}..={} exceeds 65535", proxy.start_port, last_port),
        ));
    }
    if proxy.max_connections == 0 {
        errors.push(ValidationError::new("proxy.max_connections", "must be non-zero"));
    }
    if proxy.mode == ProxyMode::Encrypted && proxy.cipher.parse::<CipherKind>().is_err() {
        errors.push(ValidationError::new(
            "proxy.cipher",
            format!("unsupported method '{}'", proxy.cipher),
        ));
    }

    match config.publish.bind_address.parse::<SocketAddr>() {
        Ok(addr) => {
            let port = addr.port() as usize;
            if proxy.users > 0 && port >= proxy.start_port as usize && port <= last_port {
                errors.push(ValidationError::new(
                    "publish.bind_address",
                    format!("port {} overlaps the proxy port range", port),
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new(
            "publish.bind_address",
            format!("invalid socket address: {}", e),
        )),
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.handshake_secs", timeouts.handshake_secs),
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.idle_secs", timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be non-zero"));
        }
    }

    let renewal = &config.renewal;
    if renewal.retry_interval_secs == 0 {
        errors.push(ValidationError::new("renewal.retry_interval_secs", "must be non-zero"));
    }
    if renewal.retry_interval_secs >= renewal.normal_interval_secs {
        errors.push(ValidationError::new(
            "renewal.retry_interval_secs",
            "must be shorter than normal_interval_secs",
        ));
    }
    // Refresh must land before expiry with at least 10% of the lifetime to spare.
    let margin = renewal.credential_lifetime_secs / 10;
    if renewal.normal_interval_secs.saturating_add(margin) > renewal.credential_lifetime_secs {
        errors.push(ValidationError::new(
            "renewal.normal_interval_secs",
            format!(
                "must be at most {}s to refresh before the {}s credential lifetime",
                renewal.credential_lifetime_secs.saturating_sub(margin),
                renewal.credential_lifetime_secs
            ),
        ));
    }
    if renewal.max_attempts == 0 {
        errors.push(ValidationError::new("renewal.max_attempts", "must be at least 1"));
    }

    if config.provisioner.kind == ProvisionerKind::Http {
        let probe = config
            .provisioner
            .source_url
            .replace("{user}", "1")
            .replace("{index}", "0");
        if let Err(e) = url::Url::parse(&probe) {
            errors.push(ValidationError::new(
                "provisioner.source_url",
                format!("invalid URL: {}", e),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "invalid socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
