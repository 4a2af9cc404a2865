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

/// Broker configuration, grounded on `original_source/src/config.c`: the same defaults,
/// the same `key=value` grammar (no sections are needed on this file; the access-policy
/// file is the one with `[section]` headers, per §6). Unrecognized keys are ignored, as
/// the source does.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_port: u16,
    pub lobby_port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    pub db_path: PathBuf,
    pub access_policy_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_port: broker_core::limits::DEFAULT_VAULT_PORT,
            lobby_port: broker_core::limits::DEFAULT_LOBBY_PORT,
            cert_path: PathBuf::from("broker.crt"),
            key_path: PathBuf::from("broker.key"),
            ca_path: PathBuf::from("ca.crt"),
            db_path: PathBuf::from("broker.db"),
            access_policy_path: PathBuf::from("access.policy"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// The CA's private key lives alongside `ca_path` as `ca.key`, the same convention
    /// `original_source/src/enroll.c` hardcodes (`-CAkey .../ca.key`) rather than a
    /// config key of its own — §6 names no such key.
    pub fn ca_key_path(&self) -> PathBuf {
        self.ca_path.with_file_name("ca.key")
    }

    fn from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();

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
                "vault_port" => {
                    config.vault_port = value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })?
                }
                "lobby_port" => {
                    config.lobby_port = value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })?
                }
                "cert_path" => config.cert_path = PathBuf::from(value),
                "key_path" => config.key_path = PathBuf::from(value),
                "ca_path" => config.ca_path = PathBuf::from(value),
                "db_path" => config.db_path = PathBuf::from(value),
                "access_policy_path" => config.access_policy_path = PathBuf::from(value),
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
    fn defaults_match_spec_when_file_is_empty() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.vault_port, 35565);
        assert_eq!(config.lobby_port, 35566);
    }

    #[test]
    fn parses_overrides_and_strips_quotes() {
        let text = "vault_port=9001\ncert_path=\"/etc/broker/cert.pem\"\n; a comment\ndb_path=/var/lib/broker.db\n";
        let config = Config::from_str(text).unwrap();
        assert_eq!(config.vault_port, 9001);
        assert_eq!(config.cert_path, PathBuf::from("/etc/broker/cert.pem"));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/broker.db"));
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let config = Config::from_str("mystery_key=1\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn ca_key_path_lives_alongside_ca_path() {
        let config = Config::from_str("ca_path=/etc/broker/ca.crt\n").unwrap();
        assert_eq!(config.ca_key_path(), PathBuf::from("/etc/broker/ca.key"));
    }

    #[test]
    fn ca_key_path_is_not_a_recognized_config_key() {
        let config = Config::from_str("ca_key_path=/somewhere/else.key\n").unwrap();
        assert_eq!(config.ca_key_path(), PathBuf::from("ca.key"));
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.vault_port == other.vault_port
            && self.lobby_port == other.lobby_port
            && self.cert_path == other.cert_path
            && self.key_path == other.key_path
            && self.ca_path == other.ca_path
            && self.db_path == other.db_path
            && self.access_policy_path == other.access_policy_path
    }
}
