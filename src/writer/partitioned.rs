use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{debug, instrument};

use super::RecordWriter;
use crate::error::PersistenceError;
use crate::Record;

/// Appends records to one file per calendar day.
///
/// A record submitted on 2024-05-01 ends up as a single JSON line in
/// `<base_dir>/feedback_2024-05-01.txt`. The base directory and the partition files are created
/// the first time they are needed, nothing is ever rotated or deleted.
///
/// The file is opened in append mode for every record and closed again before `write` returns.
/// Writers to the same partition additionally take a per-partition lock, so concurrent workers
/// can never interleave the bytes of two lines. Locks are only kept for days that are still
/// being written to: when the first record of a new day arrives, idle locks of earlier days are
/// dropped, so the table holds roughly one entry however long the writer runs.
#[derive(Debug, Clone)]
pub struct PartitionedWriter {
    // directory holding the partition files
    base_dir: Arc<PathBuf>,

    // maps partition days to the lock serializing appends to that day's file
    locks: Arc<DashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl PartitionedWriter {
    /// creates a writer that keeps its partition files in `base_dir`. The directory is not
    /// touched until the first record is written.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        PartitionedWriter {
            base_dir: Arc::new(base_dir.into()),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// the directory partition files are written to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// returns the lock for the partition of `date`, creating it on first use
    fn partition_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(&date) {
            return Arc::clone(&lock);
        }
        // a lock still cloned by a writer is in use and must survive
        self.locks
            .retain(|day, lock| *day >= date || Arc::strong_count(lock) > 1);
        self.locks.entry(date).or_default().clone()
    }

    /// number of partition locks currently held
    #[cfg(test)]
    fn tracked_partitions(&self) -> usize {
        self.locks.len()
    }
}

impl RecordWriter for PartitionedWriter {
    #[instrument(skip(self, record), fields(submitter = record.submitter_id()))]
    fn write(&self, record: &Record) -> Result<(), PersistenceError> {
        fs::create_dir_all(self.base_dir.as_path()).map_err(|source| {
            PersistenceError::CreateDir {
                path: self.base_dir.to_path_buf(),
                source,
            }
        })?;

        let path = partition_path(&self.base_dir, record.partition_date());

        let mut line = serde_json::to_vec(record).map_err(|source| PersistenceError::Serialize {
            path: path.clone(),
            source,
        })?;
        line.push(b'\n');

        let lock = self.partition_lock(record.partition_date());
        // a poisoned lock guards no data, the file itself is still usable
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::OpenFile {
                path: path.clone(),
                source,
            })?;

        debug!("writing feedback to file: {:?}", &path);
        file.write_all(&line)
            .map_err(|source| PersistenceError::Write { path, source })
    }
}

/// Constructs the partition file name for the given `date`, e.g. `feedback_2024-05-01.txt`
pub fn partition_file_name(date: NaiveDate) -> String {
    format!("feedback_{}.txt", date.format("%Y-%m-%d"))
}

/// Joins the partition file name for `date` onto the `base_dir` path
pub fn partition_path(base_dir: &Path, date: NaiveDate) -> PathBuf {
    base_dir.join(partition_file_name(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::thread;
    use tempfile::TempDir;

    fn record_on(day: u32, content: &str) -> Record {
        Record::new("u1", content, Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap())
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn file_name_is_derived_from_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(partition_file_name(date), "feedback_2024-01-09.txt");
    }

    #[test]
    fn creates_base_dir_and_appends_one_line() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("nested").join("feedback_files");
        let writer = PartitionedWriter::new(&base);

        let record = record_on(1, "hello");
        writer.write(&record).unwrap();

        let written = lines(&base.join("feedback_2024-05-01.txt"));
        assert_eq!(written.len(), 1);
        let decoded: Record = serde_json::from_str(&written[0]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn identical_records_produce_distinct_lines() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());

        writer.write(&record_on(1, "same")).unwrap();
        writer.write(&record_on(1, "same")).unwrap();

        assert_eq!(lines(&temp_dir.path().join("feedback_2024-05-01.txt")).len(), 2);
    }

    #[test]
    fn records_of_different_days_go_to_different_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());

        writer.write(&record_on(1, "first")).unwrap();
        writer.write(&record_on(2, "second")).unwrap();

        assert_eq!(lines(&temp_dir.path().join("feedback_2024-05-01.txt")).len(), 1);
        assert_eq!(lines(&temp_dir.path().join("feedback_2024-05-02.txt")).len(), 1);
    }

    #[test]
    fn base_dir_that_is_a_file_is_a_create_dir_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();

        let writer = PartitionedWriter::new(&blocker);
        match writer.write(&record_on(1, "lost")) {
            Err(PersistenceError::CreateDir { path, .. }) => assert_eq!(path, blocker),
            other => panic!("expected a CreateDir error, got {:?}", other),
        }
    }

    #[test]
    fn partition_that_is_a_directory_is_an_open_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("feedback_2024-05-01.txt")).unwrap();

        let writer = PartitionedWriter::new(temp_dir.path());
        assert!(matches!(
            writer.write(&record_on(1, "lost")),
            Err(PersistenceError::OpenFile { .. })
        ));
    }

    #[test]
    fn concurrent_writers_never_interleave_lines() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());
        let content = "x".repeat(8 * 1024);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = writer.clone();
                let content = content.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        writer.write(&record_on(3, &content)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let written = lines(&temp_dir.path().join("feedback_2024-05-03.txt"));
        assert_eq!(written.len(), 200);
        for line in written {
            let decoded: Record = serde_json::from_str(&line).unwrap();
            assert_eq!(decoded.content(), content);
        }
    }

    #[test]
    fn locks_of_finished_days_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());

        for day in 1..=5 {
            writer.write(&record_on(day, "daily")).unwrap();
        }
        assert_eq!(writer.tracked_partitions(), 1);

        // a late record for an earlier day still gets written
        writer.write(&record_on(2, "late")).unwrap();
        assert_eq!(lines(&temp_dir.path().join("feedback_2024-05-02.txt")).len(), 2);
        assert!(writer.tracked_partitions() <= 2);
    }
}
