//! Configuration management for the server.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// SQLite connection URL
    pub database_url: String,
    /// Base URL of the remote realtime database
    pub remote_url: String,
    /// Path under the remote base that holds the shared tree
    pub remote_root: String,
    /// Sent as the `auth` query parameter when set
    pub remote_auth_token: Option<String>,
    pub remote_timeout: Duration,
    /// Period of the background sync cycle
    pub sync_interval: Duration,
    /// Enables `POST /api/clean`
    pub allow_db_clean: bool,
    /// Catalog seed applied at startup
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://fieldtrack.db?mode=rwc".to_string());

        let remote_url = lookup("REMOTE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingRemoteUrl)?;

        let remote_root = lookup("REMOTE_ROOT").unwrap_or_else(|| "/".to_string());
        let remote_auth_token = lookup("REMOTE_AUTH_TOKEN").filter(|t| !t.is_empty());

        let remote_timeout = Duration::from_secs(seconds(&lookup, "REMOTE_TIMEOUT_SECS", 30)?);
        let sync_interval = Duration::from_secs(seconds(&lookup, "SYNC_INTERVAL_SECS", 60)?.max(1));

        let allow_db_clean = lookup("ALLOW_DB_CLEAN")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let seed_file = lookup("SEED_FILE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            host,
            port,
            database_url,
            remote_url,
            remote_root,
            remote_auth_token,
            remote_timeout,
            sync_interval,
            allow_db_clean,
            seed_file,
        })
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("REMOTE_URL", "https://demo.firebaseio.com")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.remote_root, "/");
        assert_eq!(config.remote_timeout, Duration::from_secs(30));
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert!(!config.allow_db_clean);
        assert!(config.seed_file.is_none());
        assert!(config.remote_auth_token.is_none());
    }

    #[test]
    fn test_remote_url_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingRemoteUrl)));
        assert!(matches!(
            load(&[("REMOTE_URL", "  ")]),
            Err(ConfigError::MissingRemoteUrl)
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            load(&[("REMOTE_URL", "http://x"), ("PORT", "eighty")]),
            Err(ConfigError::InvalidPort)
        ));
        assert!(matches!(
            load(&[("REMOTE_URL", "http://x"), ("SYNC_INTERVAL_SECS", "-1")]),
            Err(ConfigError::InvalidNumber("SYNC_INTERVAL_SECS"))
        ));
    }

    #[test]
    fn test_flags() {
        let config = load(&[
            ("REMOTE_URL", "http://x"),
            ("ALLOW_DB_CLEAN", "TRUE"),
            ("SEED_FILE", "catalogs.json"),
            ("SYNC_INTERVAL_SECS", "0"),
        ])
        .unwrap();
        assert!(config.allow_db_clean);
        assert_eq!(config.seed_file, Some(PathBuf::from("catalogs.json")));
        assert_eq!(config.sync_interval, Duration::from_secs(1));
    }
}
