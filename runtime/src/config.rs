//! Configuration for the save scheduler.

use std::time::Duration;

/// Tuning knobs for autosave scheduling.
#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    /// How long after the last edit the debounced save fires
    pub debounce: Duration,
    /// Upper bound on a single store call; a hung call becomes an error
    pub save_timeout: Duration,
    /// Delay before retrying a halted offline-queue flush cycle
    pub flush_retry: Duration,
}

impl AutosaveConfig {
    /// Override the debounce interval.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Override the per-call save timeout.
    pub fn with_save_timeout(mut self, save_timeout: Duration) -> Self {
        self.save_timeout = save_timeout;
        self
    }

    /// Override the flush retry delay.
    pub fn with_flush_retry(mut self, flush_retry: Duration) -> Self {
        self.flush_retry = flush_retry;
        self
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            save_timeout: Duration::from_secs(15),
            flush_retry: Duration::from_secs(3),
        }
    }
}
