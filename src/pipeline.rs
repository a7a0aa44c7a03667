use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::queue::BoundedQueue;
use crate::worker_pool::WorkerPool;
use crate::writer::{PartitionedWriter, RecordWriter};
use crate::{Record, Result};

/// The ingestion pipeline: a [`BoundedQueue`] drained by a [`WorkerPool`] into a
/// [`RecordWriter`].
///
/// A pipeline is created once at start-up and handed to the ingestion gateway through
/// [`Submitter`] handles. [`Pipeline::shutdown`] stops intake and waits until every record that
/// was accepted has been written.
///
/// # Example
/// ```rust
/// use feedback::{Pipeline, PipelineConfig, Submission};
/// # fn main() -> feedback::Result<()> {
/// let pipeline = Pipeline::open(PipelineConfig::default().with_base_dir("/tmp/feedback"))?;
/// pipeline.submit(Submission::new("u1", "hello").stamp_now())?;
/// pipeline.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    queue: BoundedQueue,
    // `None` once the workers were joined
    workers: Option<WorkerPool>,
}

impl Pipeline {
    /// starts a pipeline persisting records with a [`PartitionedWriter`] rooted at the
    /// configured base directory
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let writer = PartitionedWriter::new(&config.base_dir);
        Pipeline::start(&config, writer)
    }

    /// starts a pipeline whose workers persist records with the given `writer`
    ///
    /// # Errors
    /// returns [`FeedbackError::Parsing`](crate::FeedbackError::Parsing) for an invalid
    /// configuration, or an IO error if a worker thread could not be started
    #[instrument(skip(writer))]
    pub fn start<W: RecordWriter>(config: &PipelineConfig, writer: W) -> Result<Self> {
        config.validate()?;
        let queue = BoundedQueue::new(config.queue_capacity)?;
        let workers = WorkerPool::spawn(config.workers, queue.clone(), writer)?;
        info!(
            "pipeline started with {} workers and queue capacity {}",
            config.workers, config.queue_capacity
        );

        Ok(Pipeline {
            queue,
            workers: Some(workers),
        })
    }

    /// returns a handle that can submit records from any thread
    pub fn submitter(&self) -> Submitter {
        Submitter {
            queue: self.queue.clone(),
        }
    }

    /// queues `record` for writing, blocking while the queue is full
    ///
    /// # Errors
    /// returns [`FeedbackError::Closed`](crate::FeedbackError::Closed) after shutdown
    pub fn submit(&self, record: Record) -> Result<()> {
        self.queue.enqueue(record)
    }

    /// number of accepted records that have not been written yet
    pub fn pending(&self) -> usize {
        self.queue.in_flight()
    }

    /// Stops accepting records, then blocks until every record already accepted has been
    /// written and all workers have exited.
    pub fn shutdown(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.queue.close();
        if let Some(workers) = self.workers.take() {
            debug!("draining {} pending records", self.queue.in_flight());
            workers.join();
            info!("pipeline shut down");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.drain();
    }
}

/// A cloneable handle used by the ingestion gateway to submit records into a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct Submitter {
    queue: BoundedQueue,
}

impl Submitter {
    /// queues `record` for writing, blocking while the queue is full
    ///
    /// # Errors
    /// returns [`FeedbackError::Closed`](crate::FeedbackError::Closed) once the pipeline was
    /// shut down
    pub fn submit(&self, record: Record) -> Result<()> {
        self.queue.enqueue(record)
    }
}
