use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_STORAGE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

/// Settings for [`ShortenerService`](crate::ShortenerService).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    /// Prefix of every short URL, e.g. `http://localhost:8080`.
    ///
    /// A trailing `/` is ignored.
    #[builder(setter(into))]
    pub base_url: String,
    /// Upper bound on a single storage liveness probe.
    #[builder(default = DEFAULT_STORAGE_PROBE_TIMEOUT)]
    pub storage_probe_timeout: Duration,
}

/// Settings for [`DeletionDaemon`](crate::DeletionDaemon).
#[derive(Debug, Clone, TypedBuilder)]
pub struct DeletionConfig {
    /// Time between two drains of the queue.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Most requests applied by one drain.
    #[builder(default = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let shortener = ShortenerConfig::builder()
            .base_url("http://localhost:8080")
            .build();
        assert_eq!(shortener.storage_probe_timeout, Duration::from_secs(2));

        let deletion = DeletionConfig::default();
        assert_eq!(deletion.flush_interval, Duration::from_secs(5));
        assert_eq!(deletion.max_batch_size, 5);
    }
}
