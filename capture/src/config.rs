//! Process configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DOCTEL_SETTINGS` | No | `~/.doctel/settings.json` | Settings file with the `telemetry.*` keys |
//! | `DOCTEL_SERVER_URL` | No | `ws://localhost:8080` | Remote command channel endpoint |
//! | `DOCTEL_MACHINE_ID` | No | UUIDv5 of hostname | Machine identifier, also the channel `clientId` |
//! | `DOCTEL_WORKSPACE` | No | current directory | Directory whose files are treated as documents |
//! | `DOCTEL_TELEMETRY_ENABLED` | No | `true` | Initial state of the telemetry switch |
//! | `DOCTEL_SIGNAL_BUFFER` | No | 1000 | Signal and command channel capacity |
//! | `DOCTEL_REMOTE` | No | `true` | Set to `false` to skip the remote command channel |
//!
//! # Example
//!
//! ```no_run
//! use doctel_capture::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Server URL: {}", config.server_url);
//! ```

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;
use uuid::Uuid;

/// Default signal and command channel capacity.
const DEFAULT_SIGNAL_BUFFER: usize = 1000;

/// Default remote command channel endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";

/// Default settings directory name relative to home.
const DEFAULT_SETTINGS_DIR: &str = ".doctel";

const SETTINGS_FILE: &str = "settings.json";

/// Namespace for deriving machine ids from hostnames.
const MACHINE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1e_2c3a_9b7d_4e58_a1c0_d2f3_e4b5_c6a7);

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,

    /// Failed to determine the current directory.
    #[error("failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Configuration for the capture process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the telemetry settings file.
    pub settings_path: PathBuf,

    /// WebSocket URL of the collection server.
    pub server_url: String,

    pub machine_id: String,

    /// Directory whose files play the role of editor documents.
    pub workspace_dir: PathBuf,

    /// Initial state of the host telemetry switch.
    pub telemetry_enabled: bool,

    /// Capacity of the signal and command channels.
    pub buffer_size: usize,

    /// Whether to open the remote command channel.
    pub remote_enabled: bool,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `DOCTEL_SIGNAL_BUFFER` is set but is not a positive integer
    /// - `DOCTEL_TELEMETRY_ENABLED` or `DOCTEL_REMOTE` is not a boolean
    /// - A default path is needed but the home or current directory cannot be
    ///   determined
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings_path = default_settings_path()?;

        let server_url =
            env::var("DOCTEL_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let machine_id = env::var("DOCTEL_MACHINE_ID").unwrap_or_else(|_| hostname_machine_id());

        let workspace_dir = match env::var("DOCTEL_WORKSPACE") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => env::current_dir().map_err(ConfigError::CurrentDir)?,
        };

        let telemetry_enabled = parse_bool("DOCTEL_TELEMETRY_ENABLED", true)?;
        let remote_enabled = parse_bool("DOCTEL_REMOTE", true)?;

        // Optional: DOCTEL_SIGNAL_BUFFER (default: 1000, must be > 0)
        let buffer_size = match env::var("DOCTEL_SIGNAL_BUFFER") {
            Ok(val) => {
                let size = val
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "DOCTEL_SIGNAL_BUFFER".to_string(),
                        message: format!("expected positive integer, got '{val}'"),
                    })?;
                if size == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "DOCTEL_SIGNAL_BUFFER".to_string(),
                        message: "buffer size must be greater than 0".to_string(),
                    });
                }
                size
            }
            Err(_) => DEFAULT_SIGNAL_BUFFER,
        };

        Ok(Self {
            settings_path,
            server_url,
            machine_id,
            workspace_dir,
            telemetry_enabled,
            buffer_size,
            remote_enabled,
        })
    }
}

/// Returns `DOCTEL_SETTINGS`, or `~/.doctel/settings.json` when unset.
///
/// # Errors
///
/// Returns `ConfigError::NoHomeDirectory` if the variable is unset and the
/// home directory cannot be determined.
pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var("DOCTEL_SETTINGS") {
        return Ok(PathBuf::from(path));
    }

    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(base_dirs
        .home_dir()
        .join(DEFAULT_SETTINGS_DIR)
        .join(SETTINGS_FILE))
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };

    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

/// Stable machine id derived from the hostname.
fn hostname_machine_id() -> String {
    Uuid::new_v5(&MACHINE_ID_NAMESPACE, get_hostname().as_bytes()).to_string()
}

/// Gets the system hostname, falling back to "unknown" if it cannot be determined.
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Runs `f` with all DOCTEL_* vars cleared, restoring them afterwards.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("DOCTEL_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("DOCTEL_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse default config");

            assert_eq!(config.server_url, DEFAULT_SERVER_URL);
            assert_eq!(config.buffer_size, DEFAULT_SIGNAL_BUFFER);
            assert!(config.telemetry_enabled);
            assert!(config.remote_enabled);
            assert!(config.settings_path.ends_with(".doctel/settings.json"));
            assert_eq!(config.workspace_dir, env::current_dir().unwrap());
            assert!(Uuid::parse_str(&config.machine_id).is_ok());
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("DOCTEL_SETTINGS", "/etc/doctel.json");
            env::set_var("DOCTEL_SERVER_URL", "ws://collector:9000");
            env::set_var("DOCTEL_MACHINE_ID", "machine-7");
            env::set_var("DOCTEL_WORKSPACE", "/work");
            env::set_var("DOCTEL_TELEMETRY_ENABLED", "off");
            env::set_var("DOCTEL_SIGNAL_BUFFER", "64");
            env::set_var("DOCTEL_REMOTE", "false");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.settings_path, PathBuf::from("/etc/doctel.json"));
            assert_eq!(config.server_url, "ws://collector:9000");
            assert_eq!(config.machine_id, "machine-7");
            assert_eq!(config.workspace_dir, PathBuf::from("/work"));
            assert!(!config.telemetry_enabled);
            assert_eq!(config.buffer_size, 64);
            assert!(!config.remote_enabled);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_buffer_size() {
        with_clean_env(|| {
            env::set_var("DOCTEL_SIGNAL_BUFFER", "lots");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DOCTEL_SIGNAL_BUFFER")
            );
        });
    }

    #[test]
    #[serial]
    fn test_zero_buffer_size_rejected() {
        with_clean_env(|| {
            env::set_var("DOCTEL_SIGNAL_BUFFER", "0");

            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("greater than 0"));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_boolean() {
        with_clean_env(|| {
            env::set_var("DOCTEL_REMOTE", "maybe");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DOCTEL_REMOTE")
            );
        });
    }

    #[test]
    fn test_machine_id_is_stable() {
        assert_eq!(hostname_machine_id(), hostname_machine_id());
    }

    #[test]
    fn test_get_hostname() {
        assert!(!get_hostname().is_empty());
    }
}
