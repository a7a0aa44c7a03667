use std::path::PathBuf;

use crate::{FeedbackError, Result};

/// the directory partition files are written to when none is configured
pub const DEFAULT_BASE_DIR: &str = "./feedback_files";
/// the number of workers writing records concurrently
pub const DEFAULT_WORKERS: usize = 30;
/// the number of records buffered before submitters are blocked
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Settings for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// directory holding the day partition files
    pub base_dir: PathBuf,
    /// number of worker threads
    pub workers: usize,
    /// capacity of the bounded queue between the gateway and the workers
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// sets the directory partition files are written to
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// sets the number of worker threads
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// sets the capacity of the bounded queue
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// checks that the pool and the queue can make progress
    ///
    /// # Errors
    /// returns [`FeedbackError::Parsing`] if `workers` or `queue_capacity` is zero
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FeedbackError::Parsing(
                "the number of workers must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(FeedbackError::Parsing(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("./feedback_files"));
        assert_eq!(config.workers, 30);
        assert_eq!(config.queue_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sized_pool_or_queue_is_invalid() {
        assert!(PipelineConfig::default().with_workers(0).validate().is_err());
        assert!(PipelineConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
    }
}
