use std::thread;

use crossbeam::channel;
use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, error, instrument};

use crate::{FeedbackError, Result};

/// the number of threads serving client connections when none is configured
pub const DEFAULT_CONNECTION_THREADS: usize = 32;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed size thread pool that serves client connections for the
/// [`FeedbackServer`](crate::FeedbackServer).
///
/// Jobs go through a bounded crossbeam [`channel`] with room for one waiting job per thread.
/// Once every thread is busy and the channel is full, [`ConnectionPool::spawn`] blocks, which
/// stops the server from accepting more connections than it can serve.
///
/// If a job panics, the thread running it is destroyed and a new one is started in its place.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct ConnectionPool {
    /// the sending part of the channel
    tx: Sender<Job>,
    threads: usize,
}

impl ConnectionPool {
    /// create a new pool with the given number of `threads`.
    /// Every thread created will have a handle to the receiving end of the channel
    ///
    /// # Errors
    /// returns [`FeedbackError::Parsing`] if `threads` is zero, or an IO error if a thread could
    /// not be started
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(FeedbackError::Parsing(
                "the number of connection threads must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = channel::bounded::<Job>(threads);
        for _ in 0..threads {
            let job_rx = JobReceiver(rx.clone());
            spawn_runner(job_rx)?;
        }
        debug!("created connection pool with {} threads", threads);
        Ok(ConnectionPool { tx, threads })
    }

    /// the number of threads in this pool
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `job` on one of the pool's threads, blocking while all threads are busy and the
    /// pool's backlog is full.
    ///
    /// # Errors
    /// returns [`FeedbackError::Closed`] if every thread of the pool is gone
    pub fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| FeedbackError::Closed)
    }
}

/// A type that can receive jobs (i.e. closures) from a channel and run them.
/// Additionally, this type is responsible for restarting any threads that panicked
#[derive(Clone)]
struct JobReceiver(Receiver<Job>);

impl Drop for JobReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("connection thread panicked, starting a new thread");
            let job_rx = self.clone();
            if let Err(e) = spawn_runner(job_rx) {
                error!("Failed to spawn a connection thread: {}", e);
            }
        }
    }
}

fn spawn_runner(rx: JobReceiver) -> Result<()> {
    thread::Builder::new()
        .name("feedback-conn".to_string())
        .spawn(move || run_jobs(rx))?;
    Ok(())
}

/// this function waits for a job to arrive on its (wrapped) receiver, and then runs the job.
/// It returns once the pool was dropped.
#[instrument(skip(rx))]
fn run_jobs(rx: JobReceiver) {
    while let Ok(job) = rx.0.recv() {
        job();
    }
    debug!("Thread exited because the connection pool was dropped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(ConnectionPool::new(0), Err(FeedbackError::Parsing(_))));
    }

    #[test]
    fn runs_every_job() {
        let pool = ConnectionPool::new(3).unwrap();
        assert_eq!(pool.threads(), 3);
        let (done_tx, done_rx) = channel::unbounded();
        for i in 0..20 {
            let done_tx = done_tx.clone();
            pool.spawn(move || done_tx.send(i).unwrap()).unwrap();
        }
        let mut seen: Vec<i32> = (0..20)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn spawn_blocks_once_threads_and_backlog_are_busy() {
        let pool = ConnectionPool::new(1).unwrap();
        let (release_tx, release_rx) = channel::unbounded::<()>();

        // one job occupies the only thread, a second one fills the backlog
        for _ in 0..2 {
            let release_rx = release_rx.clone();
            pool.spawn(move || {
                release_rx.recv().unwrap();
            })
            .unwrap();
        }

        let (spawned_tx, spawned_rx) = channel::bounded(1);
        let blocked = thread::spawn(move || {
            pool.spawn(|| {}).unwrap();
            spawned_tx.send(()).unwrap();
        });
        assert!(spawned_rx.recv_timeout(Duration::from_millis(200)).is_err());

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        spawned_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        blocked.join().unwrap();
    }

    #[test]
    fn a_panicking_job_does_not_shrink_the_pool() {
        let pool = ConnectionPool::new(1).unwrap();
        pool.spawn(|| panic!("connection handler exploded")).unwrap();

        let (done_tx, done_rx) = channel::bounded(1);
        pool.spawn(move || done_tx.send(()).unwrap()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
