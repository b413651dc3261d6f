// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for the Switchboard core.
//!
//! Configuration is read once at startup from the process environment and
//! carried as a plain struct from then on. Components never read env vars
//! directly.

use crate::error::CoreError;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The system-wide risk posture, raised by operators during incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SystemRiskPosture {
    /// Normal operation.
    #[default]
    Normal,
    /// Raise non-mandatory approval requirements to elevated.
    Elevated,
    /// Force mandatory approval on everything.
    Critical,
}

impl std::str::FromStr for SystemRiskPosture {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "elevated" => Ok(Self::Elevated),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::Validation(format!(
                "unknown SYSTEM_RISK_POSTURE '{}'",
                other
            ))),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_rate_limit_max() -> u32 {
    120
}
fn default_rate_limit_window_ms() -> i64 {
    60_000
}

/// Process configuration, loaded from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    /// Listen port for the HTTP frontend.
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQL connection string, when persistence is external.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Redis connection string, required when running more than one instance
    /// so counters and chain tips are shared.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Allowed CORS origins. Empty means reflect the request origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Ingress rate limit: maximum requests per window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    /// Ingress rate limit window, in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: i64,
    /// Shared secret for internal service-to-service calls.
    #[serde(default)]
    pub internal_api_secret: Option<String>,
    /// 32-byte key for AES-GCM credential encryption, decoded from base64.
    #[serde(default, skip_serializing)]
    pub credential_encryption_key: Option<[u8; 32]>,
    /// The system-wide risk posture.
    #[serde(default)]
    pub system_risk_posture: SystemRiskPosture,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: None,
            redis_url: None,
            cors_origins: Vec::new(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            internal_api_secret: None,
            credential_encryption_key: None,
            system_risk_posture: SystemRiskPosture::Normal,
        }
    }
}

impl SwitchboardConfig {
    /// Loads configuration from the process environment.
    ///
    /// Unset variables fall back to defaults; set-but-invalid variables are
    /// a hard startup error so misconfiguration never degrades silently.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PORT") {
            cfg.port = v
                .parse()
                .map_err(|_| CoreError::Validation(format!("invalid PORT '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            if !v.is_empty() {
                cfg.database_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            if !v.is_empty() {
                cfg.redis_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("CORS_ORIGIN") {
            cfg.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_MAX") {
            cfg.rate_limit_max = v
                .parse()
                .map_err(|_| CoreError::Validation(format!("invalid RATE_LIMIT_MAX '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_WINDOW_MS") {
            cfg.rate_limit_window_ms = v.parse().map_err(|_| {
                CoreError::Validation(format!("invalid RATE_LIMIT_WINDOW_MS '{}'", v))
            })?;
        }
        if let Ok(v) = std::env::var("INTERNAL_API_SECRET") {
            if !v.is_empty() {
                cfg.internal_api_secret = Some(v);
            }
        }
        if let Ok(v) = std::env::var("CREDENTIAL_ENCRYPTION_KEY") {
            cfg.credential_encryption_key = Some(Self::decode_key(&v)?);
        }
        if let Ok(v) = std::env::var("SYSTEM_RISK_POSTURE") {
            cfg.system_risk_posture = v.parse()?;
        }

        Ok(cfg)
    }

    /// Decodes and length-checks the credential encryption key.
    pub fn decode_key(encoded: &str) -> Result<[u8; 32], CoreError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                CoreError::Validation(format!("CREDENTIAL_ENCRYPTION_KEY is not base64: {}", e))
            })?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::Validation("CREDENTIAL_ENCRYPTION_KEY must decode to 32 bytes".into())
        })?;
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn key_must_be_32_bytes() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(SwitchboardConfig::decode_key(&short).is_err());
        let good = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        assert_eq!(SwitchboardConfig::decode_key(&good).unwrap(), [7u8; 32]);
    }

    #[test]
    fn posture_parses() {
        assert_eq!(
            "elevated".parse::<SystemRiskPosture>().unwrap(),
            SystemRiskPosture::Elevated
        );
        assert!("panic".parse::<SystemRiskPosture>().is_err());
    }
}
