use std::thread;

use crossbeam::sync::WaitGroup;
use tracing::{debug, dispatcher, error, info, instrument, Dispatch};

use crate::queue::BoundedQueue;
use crate::writer::RecordWriter;
use crate::Result;

/// A fixed size pool of worker threads draining a [`BoundedQueue`] into a [`RecordWriter`].
///
/// Every worker loops forever: dequeue one record, write it, repeat. A failed write is logged
/// and the record is dropped, the worker simply moves on to the next record. Workers only exit
/// once the queue has been closed and drained.
///
/// If a worker panics, its thread is destroyed and a new one is started on the same queue, so
/// the pool keeps its size. Workers are tracked with a crossbeam [`WaitGroup`] rather than join
/// handles, which lets [`WorkerPool::join`] also wait for any replacement workers.
///
/// Workers log through the tracing subscriber that was the default on the thread that called
/// [`WorkerPool::spawn`].
///
/// [`WaitGroup`]: https://docs.rs/crossbeam/0.8.1/crossbeam/sync/struct.WaitGroup.html
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    alive: WaitGroup,
}

impl WorkerPool {
    /// starts `size` workers, each with its own clone of `writer`, all pulling from `queue`
    ///
    /// # Errors
    /// returns an IO error if a worker thread could not be started. The queue is closed in that
    /// case, so the workers that did start exit once it is drained.
    pub fn spawn<W: RecordWriter>(size: usize, queue: BoundedQueue, writer: W) -> Result<Self> {
        WorkerPool::spawn_with(size, queue, writer, spawn_worker)
    }

    fn spawn_with<W, S>(size: usize, queue: BoundedQueue, writer: W, mut spawn: S) -> Result<Self>
    where
        W: RecordWriter,
        S: FnMut(Worker<W>) -> Result<()>,
    {
        let alive = WaitGroup::new();
        let dispatch = dispatcher::get_default(|current| current.clone());
        for id in 0..size {
            let worker = Worker {
                id,
                queue: queue.clone(),
                writer: writer.clone(),
                dispatch: dispatch.clone(),
                _alive: alive.clone(),
            };
            if let Err(e) = spawn(worker) {
                error!("Failed to start feedback-worker-{}: {}", id, e);
                queue.close();
                return Err(e);
            }
        }
        info!("started {} feedback workers", size);

        Ok(WorkerPool { size, alive })
    }

    /// the number of workers in this pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Blocks until every worker has exited.
    ///
    /// Workers only exit after their queue was closed and emptied, so close the queue first.
    pub fn join(self) {
        self.alive.wait();
        debug!("all {} feedback workers exited", self.size);
    }
}

/// The state owned by a single worker thread.
///
/// When a worker thread panics this value is dropped during unwinding, and its `Drop` impl
/// starts a replacement thread with a clone of itself.
#[derive(Clone)]
struct Worker<W: RecordWriter> {
    id: usize,
    queue: BoundedQueue,
    writer: W,
    // the subscriber the worker logs to
    dispatch: Dispatch,
    // dropped when the worker thread ends
    _alive: WaitGroup,
}

impl<W: RecordWriter> Drop for Worker<W> {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("feedback-worker-{} panicked, starting a new worker", self.id);
            let worker = self.clone();
            if let Err(e) = spawn_worker(worker) {
                error!("Failed to spawn a worker thread: {}", e);
            }
        }
    }
}

fn spawn_worker<W: RecordWriter>(worker: Worker<W>) -> Result<()> {
    thread::Builder::new()
        .name(format!("feedback-worker-{}", worker.id))
        .spawn(move || {
            let dispatch = worker.dispatch.clone();
            dispatcher::with_default(&dispatch, || run_worker(worker))
        })?;
    Ok(())
}

/// waits for a record to arrive on the worker's queue, and then writes it
#[instrument(skip(worker), fields(worker = worker.id))]
fn run_worker<W: RecordWriter>(worker: Worker<W>) {
    while let Some(delivery) = worker.queue.dequeue() {
        debug!("received a new record");
        if let Err(e) = worker.writer.write(&delivery) {
            error!(submitter = delivery.submitter_id(), "dropping feedback: {}", e);
        }
    }
    debug!("worker exited because the queue was closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::{FeedbackError, Record};
    use chrono::Utc;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<String>>>);

    impl RecordWriter for Collect {
        fn write(&self, record: &Record) -> std::result::Result<(), PersistenceError> {
            if record.content() == "boom" {
                panic!("writer exploded");
            }
            self.0.lock().unwrap().push(record.content().to_string());
            Ok(())
        }
    }

    #[test]
    fn workers_drain_the_queue_and_exit_once_closed() {
        let queue = BoundedQueue::new(8).unwrap();
        let writer = Collect::default();
        let pool = WorkerPool::spawn(3, queue.clone(), writer.clone()).unwrap();
        assert_eq!(pool.size(), 3);

        for i in 0..50 {
            queue.enqueue(Record::new("u1", i.to_string(), Utc::now())).unwrap();
        }
        queue.close();
        pool.join();

        let mut written = writer.0.lock().unwrap().clone();
        written.sort_by_key(|s| s.parse::<u32>().unwrap());
        assert_eq!(written, (0..50).map(|i| i.to_string()).collect::<Vec<_>>());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn a_panicking_worker_is_replaced() {
        let queue = BoundedQueue::new(4).unwrap();
        let writer = Collect::default();
        let pool = WorkerPool::spawn(1, queue.clone(), writer.clone()).unwrap();

        queue.enqueue(Record::new("u1", "boom", Utc::now())).unwrap();
        for i in 0..5 {
            queue.enqueue(Record::new("u1", i.to_string(), Utc::now())).unwrap();
        }
        queue.close();
        pool.join();

        assert_eq!(writer.0.lock().unwrap().len(), 5);
    }

    #[test]
    fn a_failed_spawn_closes_the_queue() {
        let queue = BoundedQueue::new(4).unwrap();
        let mut started = 0;
        let result = WorkerPool::spawn_with(3, queue.clone(), Collect::default(), |worker| {
            if started == 2 {
                return Err(io::Error::new(io::ErrorKind::Other, "no more threads").into());
            }
            started += 1;
            spawn_worker(worker)
        });

        assert!(matches!(result, Err(FeedbackError::Io(_))));
        assert!(queue.is_closed());
        assert!(matches!(
            queue.enqueue(Record::new("u1", "late", Utc::now())),
            Err(FeedbackError::Closed)
        ));
    }
}
