use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam::channel;
use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, trace};

use crate::{FeedbackError, Record, Result};

/// A fixed capacity, first-in-first-out queue of [`Record`]s shared between the ingestion
/// gateway (producers) and the worker pool (consumers).
///
/// This is a thin wrapper over a bounded MPMC [`channel`] from the crossbeam crate. Producers
/// block in [`BoundedQueue::enqueue`] while the queue is full, which is the only backpressure in
/// the pipeline. Nothing is ever dropped or reordered.
///
/// The queue also counts records that are "in flight": a record is counted from the moment it
/// is enqueued until the worker that dequeued it drops the returned [`Delivery`]. Counting from
/// the enqueue side means a shutdown can never overlook a record that was queued but not yet
/// picked up by a worker.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
#[derive(Debug, Clone)]
pub struct BoundedQueue {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    // the sending half, `None` once the queue has been closed
    tx: RwLock<Option<Sender<Record>>>,
    rx: Receiver<Record>,
    capacity: usize,
    in_flight: AtomicUsize,
}

impl BoundedQueue {
    /// creates a new, open queue that buffers at most `capacity` records
    ///
    /// # Errors
    /// returns [`FeedbackError::Parsing`] if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(FeedbackError::Parsing(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = channel::bounded(capacity);
        Ok(BoundedQueue {
            shared: Arc::new(Shared {
                tx: RwLock::new(Some(tx)),
                rx,
                capacity,
                in_flight: AtomicUsize::new(0),
            }),
        })
    }

    /// Appends `record` to the back of the queue, blocking the caller until there is a free
    /// slot.
    ///
    /// # Errors
    /// returns [`FeedbackError::Closed`] if the queue was closed by a pipeline shutdown
    pub fn enqueue(&self, record: Record) -> Result<()> {
        let tx = self.shared.tx.read().unwrap_or_else(PoisonError::into_inner);
        let tx = tx.as_ref().ok_or(FeedbackError::Closed)?;

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if tx.is_full() {
            debug!(capacity = self.shared.capacity, "queue is full, waiting for a free slot");
        }
        tx.send(record).map_err(|_| {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            FeedbackError::Closed
        })?;
        trace!(queued = tx.len(), "record queued");
        Ok(())
    }

    /// Removes the record at the front of the queue, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed and every queued record has been handed out.
    pub fn dequeue(&self) -> Option<Delivery> {
        self.shared.rx.recv().ok().map(|record| Delivery {
            record,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stops accepting new records. Records already queued can still be dequeued, after which
    /// [`BoundedQueue::dequeue`] returns `None`.
    ///
    /// Blocks while producers are waiting on a full queue, until they have placed their records.
    pub fn close(&self) {
        let mut tx = self.shared.tx.write().unwrap_or_else(PoisonError::into_inner);
        if tx.take().is_some() {
            debug!(queued = self.shared.rx.len(), "queue closed");
        }
    }

    /// returns `true` once [`BoundedQueue::close`] was called
    pub fn is_closed(&self) -> bool {
        self.shared
            .tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// number of records currently waiting in the queue
    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    /// returns `true` if no record is waiting in the queue
    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }

    /// the maximum number of records the queue buffers before producers block
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// number of records that were enqueued but whose [`Delivery`] has not been dropped yet
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }
}

/// A record handed out by [`BoundedQueue::dequeue`].
///
/// The record stays counted as in flight until the delivery is dropped, so a worker should keep
/// it alive until the record has been written.
#[derive(Debug)]
pub struct Delivery {
    record: Record,
    shared: Arc<Shared>,
}

impl Deref for Delivery {
    type Target = Record;

    fn deref(&self) -> &Record {
        &self.record
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::thread;
    use std::time::Duration;

    fn record(content: &str) -> Record {
        Record::new("u1", content, Utc::now())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(BoundedQueue::new(0), Err(FeedbackError::Parsing(_))));
    }

    #[test]
    fn dequeues_in_enqueue_order() {
        let queue = BoundedQueue::new(10).unwrap();
        for i in 0..5 {
            queue.enqueue(record(&i.to_string())).unwrap();
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            let delivery = queue.dequeue().unwrap();
            assert_eq!(delivery.content(), i.to_string());
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn in_flight_counts_until_the_delivery_is_dropped() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.enqueue(record("a")).unwrap();
        queue.enqueue(record("b")).unwrap();
        assert_eq!(queue.in_flight(), 2);

        let first = queue.dequeue().unwrap();
        assert_eq!(queue.in_flight(), 2);
        drop(first);
        assert_eq!(queue.in_flight(), 1);
    }

    #[test]
    fn closed_queue_rejects_new_records_but_keeps_queued_ones() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.enqueue(record("kept")).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue(record("late")), Err(FeedbackError::Closed)));
        assert_eq!(queue.dequeue().unwrap().content(), "kept");
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn full_queue_blocks_the_producer() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.enqueue(record("first")).unwrap();

        let (done_tx, done_rx) = channel::bounded(1);
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.enqueue(record("second")).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(queue.dequeue().unwrap().content(), "first");
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(queue.dequeue().unwrap().content(), "second");
    }
}
