// Acquirer constants and configuration (no magic values)
use std::time::Duration;

/// Period of the per-domain backup poll (30s)
/// Bounds how long a job can sit unnoticed if its posting was lost
pub const DEFAULT_BACKUP_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// First retry delay when subscribing to job postings fails (500ms)
pub const DEFAULT_SUBSCRIBE_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Retry delay cap when subscribing to job postings fails (10s)
pub const DEFAULT_SUBSCRIBE_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How long a long-poll acquire waits before returning empty-handed (5s)
pub const DEFAULT_ACQUIRE_JOB_LONG_POLL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub backup_poll_interval: Duration,
    pub subscribe_initial_backoff: Duration,
    pub subscribe_max_backoff: Duration,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            backup_poll_interval: DEFAULT_BACKUP_POLL_INTERVAL,
            subscribe_initial_backoff: DEFAULT_SUBSCRIBE_INITIAL_BACKOFF,
            subscribe_max_backoff: DEFAULT_SUBSCRIBE_MAX_BACKOFF,
        }
    }
}
