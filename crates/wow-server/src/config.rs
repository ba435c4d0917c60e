//! Environment-variable configuration (Section 6 of the design).
//!
//! No file to deserialize here — the only ambient config surface is a
//! short, fixed list of env vars, so parsing is a manual `env::var` +
//! `.parse()` per field (the same texture as hand-rolled config loaders
//! elsewhere in the corpus), rather than a TOML/serde layer.

use std::time::Duration;

use wow_pow::Algorithm;
use wow_validate::RateLimitKeyKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0} must be at least {min} characters")]
    TooShort { var: &'static str, min: usize },

    #[error("{var}={value:?} is not a recognized value")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var}={value:?} is not a valid integer: {source}")]
    InvalidInt {
        var: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which backend persists the HMAC key store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyStoreBackend {
    Sqlite { path: String },
    File { path: String },
}

/// Process-wide configuration, loaded once at startup (Section 9: "global
/// state as explicit dependencies", not statics).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub master_secret: String,
    pub algorithm: Algorithm,
    pub initial_difficulty: u8,
    pub connection_timeout: Duration,
    pub challenge_format: wow_challenge::codec::Format,
    pub port: u16,
    pub key_store_backend: KeyStoreBackend,
    pub rate_limit_key: RateLimitKeyKind,
    pub replay_protection: bool,
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let master_secret =
            env_var("WOW_MASTER_SECRET").ok_or(ConfigError::Missing("WOW_MASTER_SECRET"))?;
        if master_secret.len() < wow_keystore::crypto::MIN_MASTER_SECRET_LEN {
            return Err(ConfigError::TooShort {
                var: "WOW_MASTER_SECRET",
                min: wow_keystore::crypto::MIN_MASTER_SECRET_LEN,
            });
        }

        let algorithm = match env_var("WOW_ALGORITHM").as_deref() {
            None => Algorithm::Argon2id,
            Some("sha256") => Algorithm::Sha256,
            Some("argon2") | Some("argon2id") => Algorithm::Argon2id,
            Some(other) => {
                return Err(ConfigError::InvalidValue { var: "WOW_ALGORITHM", value: other.to_string() })
            }
        };

        let initial_difficulty = match env_var("WOW_INITIAL_DIFFICULTY") {
            None => 2,
            Some(raw) => {
                let value: u8 = raw.parse().map_err(|source| ConfigError::InvalidInt {
                    var: "WOW_INITIAL_DIFFICULTY",
                    value: raw.clone(),
                    source,
                })?;
                if wow_pow::validate_difficulty(value).is_err() {
                    return Err(ConfigError::InvalidValue {
                        var: "WOW_INITIAL_DIFFICULTY",
                        value: raw,
                    });
                }
                value
            }
        };

        let connection_timeout = match env_var("WOW_CONNECTION_TIMEOUT") {
            None => Duration::from_secs(30),
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|source| ConfigError::InvalidInt {
                    var: "WOW_CONNECTION_TIMEOUT",
                    value: raw,
                    source,
                })?;
                Duration::from_secs(secs)
            }
        };

        let challenge_format = match env_var("WOW_CHALLENGE_FORMAT").as_deref() {
            None | Some("binary") => wow_challenge::codec::Format::Binary,
            Some("json") => wow_challenge::codec::Format::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue { var: "WOW_CHALLENGE_FORMAT", value: other.to_string() })
            }
        };

        let port = match env_var("WOW_PORT") {
            None => 8080,
            Some(raw) => raw.parse().map_err(|source| ConfigError::InvalidInt {
                var: "WOW_PORT",
                value: raw,
                source,
            })?,
        };

        let key_store_backend = match env_var("WOW_KEY_STORE_BACKEND").as_deref() {
            None | Some("sqlite") => KeyStoreBackend::Sqlite {
                path: env_var("WOW_KEY_STORE_PATH").unwrap_or_else(|| "wow-keys.db".to_string()),
            },
            Some("file") => KeyStoreBackend::File {
                path: env_var("WOW_KEY_STORE_PATH").unwrap_or_else(|| "wow-keys.json".to_string()),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "WOW_KEY_STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let rate_limit_key = match env_var("WOW_RATE_LIMIT_KEY").as_deref() {
            None | Some("client_id") => RateLimitKeyKind::ClientId,
            Some("remote_ip") => RateLimitKeyKind::RemoteIp,
            Some(other) => {
                return Err(ConfigError::InvalidValue { var: "WOW_RATE_LIMIT_KEY", value: other.to_string() })
            }
        };

        let replay_protection = match env_var("WOW_REPLAY_PROTECTION").as_deref() {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "WOW_REPLAY_PROTECTION",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            master_secret,
            algorithm,
            initial_difficulty,
            connection_timeout,
            challenge_format,
            port,
            key_store_backend,
            rate_limit_key,
            replay_protection,
        })
    }
}
