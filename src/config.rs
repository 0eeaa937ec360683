use std::time::Duration;

/// Library name/version constants
pub const LIB_NAME: &str = "docflow";
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Delay between extraction completion and AI classification. Decouples
/// AI load from the synchronous path; a tunable, not a correctness
/// invariant.
pub const DEFAULT_AI_CLASSIFY_DELAY_SECS: u64 = 30;

/// Default lock lifetime when the caller does not pass one.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// How often the background sweeper releases stale locks.
pub const DEFAULT_LOCK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Hard cap for bulk actions that stream bytes back to the caller.
pub const DEFAULT_BULK_DOWNLOAD_LIMIT: usize = 20;

/// Maximum accepted content size per commit (100MB).
pub const MAX_CONTENT_BYTES: usize = 100 * 1024 * 1024;

/// Coordinator tunables, passed to `DocumentService::new`.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub ai_classify_delay: Duration,
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    pub bulk_download_limit: usize,
    pub max_content_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ai_classify_delay: Duration::from_secs(DEFAULT_AI_CLASSIFY_DELAY_SECS),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            lock_sweep_interval: Duration::from_secs(DEFAULT_LOCK_SWEEP_INTERVAL_SECS),
            bulk_download_limit: DEFAULT_BULK_DOWNLOAD_LIMIT,
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

pub fn default_log_filter() -> &'static str {
    "docflow=info"
}

/// Route tracing output through the test harness. Safe to call from
/// every test; only the first call installs the subscriber.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_log_filter())
        .with_test_writer()
        .try_init();
}
