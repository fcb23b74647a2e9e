use std::time::Duration;

use cachelift_core::MigrateError;
use serde::Serialize;

pub const DEFAULT_PARALLELISM: usize = 16;
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineOptions {
    /// Maximum inserts in flight at once.
    pub parallelism: usize,
    /// Cadence of progress snapshots.
    pub update_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

impl PipelineOptions {
    pub fn new(parallelism: usize, update_interval: Duration) -> Self {
        Self {
            parallelism,
            update_interval,
        }
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.parallelism == 0 {
            return Err(MigrateError::Configuration(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.update_interval.is_zero() {
            return Err(MigrateError::Configuration(
                "update interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
