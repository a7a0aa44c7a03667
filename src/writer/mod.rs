//! This module provides the sinks that the worker pool persists records into.
//! The only sink shipped is [`PartitionedWriter`], which appends every record to a JSON-lines
//! file named after the day the record was submitted on.
use crate::error::PersistenceError;
use crate::Record;

/// A trait for anything the worker pool can hand a dequeued [`Record`] to.
///
/// Every worker holds its own clone of the writer and calls [`RecordWriter::write`] once per
/// record, so implementations must be safe to call from many threads at once.
pub trait RecordWriter: Clone + Send + 'static {
    /// persists a single `record`
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] describing which step of the write failed. The caller logs
    /// the error and drops the record; it is never retried.
    fn write(&self, record: &Record) -> Result<(), PersistenceError>;
}

mod partitioned;

pub use self::partitioned::{partition_file_name, partition_path, PartitionedWriter};
