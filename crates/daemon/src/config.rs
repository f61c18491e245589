//! Daemon configuration, read from `PROVISIONERD_*` environment variables

use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.provisionerd/jobs.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9528;
const DEFAULT_ACQUIRE_LONG_POLL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub backup_poll_interval: Duration,
    pub acquire_long_poll: Duration,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup("PROVISIONERD_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let rpc_host =
            lookup("PROVISIONERD_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string());

        let rpc_port = match lookup("PROVISIONERD_RPC_PORT") {
            Some(s) => s
                .parse()
                .with_context(|| format!("invalid PROVISIONERD_RPC_PORT '{}'", s))?,
            None => DEFAULT_RPC_PORT,
        };

        let backup_poll_interval = match lookup("PROVISIONERD_BACKUP_POLL_SECS") {
            Some(s) => {
                let secs: u64 = s
                    .parse()
                    .with_context(|| format!("invalid PROVISIONERD_BACKUP_POLL_SECS '{}'", s))?;
                if secs == 0 {
                    anyhow::bail!("PROVISIONERD_BACKUP_POLL_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
            None => provisionerd_core::application::acquirer::DEFAULT_BACKUP_POLL_INTERVAL,
        };

        let acquire_long_poll_ms = match lookup("PROVISIONERD_ACQUIRE_LONG_POLL_MS") {
            Some(s) => s
                .parse()
                .with_context(|| format!("invalid PROVISIONERD_ACQUIRE_LONG_POLL_MS '{}'", s))?,
            None => DEFAULT_ACQUIRE_LONG_POLL_MS,
        };

        let log_format = match lookup("PROVISIONERD_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            db_path,
            rpc_host,
            rpc_port,
            backup_poll_interval,
            acquire_long_poll: Duration::from_millis(acquire_long_poll_ms),
            log_format,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::assert_err;

    fn config_from(pairs: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.db_path.ends_with(".provisionerd/jobs.db"));
        assert!(!config.db_path.starts_with('~'));
        assert_eq!(config.rpc_host, "127.0.0.1");
        assert_eq!(config.rpc_port, 9528);
        assert_eq!(config.backup_poll_interval, Duration::from_secs(30));
        assert_eq!(config.acquire_long_poll, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PROVISIONERD_DB_PATH", "/var/lib/provisionerd/jobs.db"),
            ("PROVISIONERD_RPC_PORT", "7000"),
            ("PROVISIONERD_BACKUP_POLL_SECS", "2"),
            ("PROVISIONERD_ACQUIRE_LONG_POLL_MS", "250"),
            ("PROVISIONERD_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url(),
            "sqlite:///var/lib/provisionerd/jobs.db"
        );
        assert_eq!(config.rpc_port, 7000);
        assert_eq!(config.backup_poll_interval, Duration::from_secs(2));
        assert_eq!(config.acquire_long_poll, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_err!(config_from(&[("PROVISIONERD_RPC_PORT", "http")]));
        assert_err!(config_from(&[("PROVISIONERD_BACKUP_POLL_SECS", "0")]));
        assert_err!(config_from(&[("PROVISIONERD_ACQUIRE_LONG_POLL_MS", "-1")]));
    }
}
