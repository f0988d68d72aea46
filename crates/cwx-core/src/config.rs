use cwx_crypto::KdfCost;
use serde::{Deserialize, Serialize};

use crate::error::{CwxError, CwxResult};

/// Environment variables that override the `[crypto]` derivation cost
pub const ENV_MEM_COST: &str = "ARGON_MEM_COST";
pub const ENV_TIME_COST: &str = "ARGON_TIME_COST";
pub const ENV_THREADS: &str = "ARGON_THREADS";

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CwxConfig {
    pub crypto: CryptoConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// File-password (PEK) derivation cost used for new registrations and for
/// KEK records that carry no cost of their own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let cost = KdfCost::default();
        Self {
            argon2_mem_cost_kib: cost.mem_cost_kib,
            argon2_time_cost: cost.time_cost,
            argon2_parallelism: cost.parallelism,
        }
    }
}

impl CryptoConfig {
    pub fn kdf_cost(&self) -> KdfCost {
        KdfCost {
            mem_cost_kib: self.argon2_mem_cost_kib,
            time_cost: self.argon2_time_cost,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// Login-password hash profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Argon2id memory cost in KiB (default: 19456 = 19 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (default: 2)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let cost = KdfCost::auth_default();
        Self {
            argon2_mem_cost_kib: cost.mem_cost_kib,
            argon2_time_cost: cost.time_cost,
            argon2_parallelism: cost.parallelism,
        }
    }
}

impl AuthConfig {
    pub fn kdf_cost(&self) -> KdfCost {
        KdfCost {
            mem_cost_kib: self.argon2_mem_cost_kib,
            time_cost: self.argon2_time_cost,
            parallelism: self.argon2_parallelism,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl CwxConfig {
    pub fn from_toml_str(s: &str) -> CwxResult<Self> {
        toml::from_str(s).map_err(|e| CwxError::Config(e.to_string()))
    }

    /// Apply `ARGON_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> CwxResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `ARGON_*` overrides from `lookup`. Unset or empty variables are
    /// ignored; anything else must parse as a non-negative integer.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CwxResult<()> {
        let targets = [
            (ENV_MEM_COST, &mut self.crypto.argon2_mem_cost_kib),
            (ENV_TIME_COST, &mut self.crypto.argon2_time_cost),
            (ENV_THREADS, &mut self.crypto.argon2_parallelism),
        ];
        for (key, slot) in targets {
            let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| CwxError::Config(format!("{key} must be a non-negative integer")))?;
            tracing::debug!(key, "derivation cost overridden from environment");
        }
        Ok(())
    }

    /// Reject cost settings Argon2id would refuse, before any derivation runs.
    pub fn validate(&self) -> CwxResult<()> {
        self.crypto
            .kdf_cost()
            .validate()
            .map_err(|e| CwxError::Config(format!("[crypto] {e}")))?;
        self.auth
            .kdf_cost()
            .validate()
            .map_err(|e| CwxError::Config(format!("[auth] {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[crypto]
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8

[auth]
argon2_mem_cost_kib = 32768
argon2_time_cost = 3
argon2_parallelism = 2

[logging]
level = "debug"
format = "json"
"#;
        let config = CwxConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.crypto.kdf_cost().time_cost, 4);
        assert_eq!(config.auth.kdf_cost().parallelism, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config = CwxConfig::from_toml_str("").unwrap();

        assert_eq!(config.crypto.kdf_cost(), KdfCost::default());
        assert_eq!(config.auth.kdf_cost(), KdfCost::auth_default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
argon2_time_cost = 5
"#;
        let config = CwxConfig::from_toml_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.argon2_time_cost, 5);
        // Defaults
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert_eq!(config.crypto.argon2_parallelism, 4);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = CwxConfig::from_toml_str("[crypto]\nargon2_time_cost = \"three\"");
        assert!(matches!(result, Err(CwxError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ARGON_MEM_COST", "2048"),
            ("ARGON_TIME_COST", " 2 "),
            ("ARGON_THREADS", ""),
        ]
        .into_iter()
        .collect();

        let mut config = CwxConfig::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.crypto.argon2_mem_cost_kib, 2048);
        assert_eq!(config.crypto.argon2_time_cost, 2);
        assert_eq!(config.crypto.argon2_parallelism, 4, "empty value is ignored");
    }

    #[test]
    fn test_env_override_unparseable() {
        let mut config = CwxConfig::default();
        let err = config
            .apply_env_with(|k| (k == ENV_THREADS).then(|| "four".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_THREADS));
    }

    #[test]
    fn test_validate_rejects_zero_cost() {
        let mut config = CwxConfig::default();
        config.crypto.argon2_time_cost = 0;
        assert!(matches!(config.validate(), Err(CwxError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_cost_above_ceiling() {
        let mut config = CwxConfig::default();
        config
            .apply_env_with(|k| (k == ENV_MEM_COST).then(|| u32::MAX.to_string()))
            .unwrap();
        assert!(matches!(config.validate(), Err(CwxError::Config(_))));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = CwxConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = CwxConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.crypto.kdf_cost(), parsed.crypto.kdf_cost());
        assert_eq!(config.logging.format, parsed.logging.format);
    }
}
