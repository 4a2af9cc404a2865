use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Agent configuration, grounded on `original_source/src/agent_config.c`: same defaults,
/// same `key=value` grammar, unrecognized keys ignored. `action_dir` is kept as a field
/// for fidelity with the source format even though the local action-dispatch it once
/// configured is out of scope here (§1 Non-goals) — nothing in this crate reads it back.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub broker_ip: String,
    pub broker_port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    pub command_group: String,
    pub action_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker_ip: "127.0.0.1".to_owned(),
            broker_port: broker_core::limits::DEFAULT_VAULT_PORT,
            cert_path: PathBuf::from("certs/client.crt"),
            key_path: PathBuf::from("certs/client.key"),
            ca_path: PathBuf::from("certs/ca.crt"),
            command_group: "CMD-GRP-1".to_owned(),
            action_dir: PathBuf::from("./actions"),
        }
    }
}

impl AgentConfig {
    /// Loads overrides from `path`; a missing file is not an error (the source prints a
    /// warning and falls back to defaults, same as `agent_config_load`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(path = %path.display(), "could not open agent config, using defaults");
                return Ok(Self::default());
            }
        };
        Self::from_str(&text)
    }

    fn from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config = AgentConfig::default();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = strip_quotes(value.trim());

            match key {
                "broker_ip" => config.broker_ip = value.to_owned(),
                "broker_port" => {
                    config.broker_port = value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })?
                }
                "cert_path" => config.cert_path = PathBuf::from(value),
                "key_path" => config.key_path = PathBuf::from(value),
                "ca_path" => config.ca_path = PathBuf::from(value),
                "command_group" => config.command_group = value.to_owned(),
                "action_dir" => config.action_dir = PathBuf::from(value),
                _ => {}
            }
        }

        Ok(config)
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_when_file_is_empty() {
        let config = AgentConfig::from_str("").unwrap();
        assert_eq!(config.broker_ip, "127.0.0.1");
        assert_eq!(config.broker_port, 35565);
        assert_eq!(config.command_group, "CMD-GRP-1");
    }

    #[test]
    fn parses_overrides_and_strips_quotes() {
        let text = "broker_ip=10.0.0.5\ncommand_group=\"CMD-GRP-9\"\n; a comment\nbroker_port=9001\n";
        let config = AgentConfig::from_str(text).unwrap();
        assert_eq!(config.broker_ip, "10.0.0.5");
        assert_eq!(config.command_group, "CMD-GRP-9");
        assert_eq!(config.broker_port, 9001);
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let config = AgentConfig::from_str("mystery_key=1\n").unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AgentConfig::load(Path::new("/nonexistent/agent.conf")).unwrap();
        assert_eq!(config, AgentConfig::default());
    }
}
