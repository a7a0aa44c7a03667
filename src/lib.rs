#![deny(missing_docs)]
//! A multithreaded feedback ingestion service that records short text submissions into one
//! append-only file per calendar day.
//!
//! This crate provides the ingestion [`Pipeline`] itself, as well as a [`feedback-client`]
//! and [`feedback-server`] executable that can be used to submit feedback over the network.
//! Submissions are sent between the client and server using synchronous networking over a
//! small JSON protocol.
//!
//! ## Pipeline
//! The [`Pipeline`] is the brains of this entire operation. It is made of three parts:
//! - a [`BoundedQueue`] that buffers accepted records. Submitting into a full queue blocks
//! the submitter until a worker frees a slot, this is the only backpressure in the system.
//! - a [`WorkerPool`] of long-lived threads, each taking one record at a time from the queue
//! and handing it to a [`RecordWriter`]
//! - the [`PartitionedWriter`], which appends every record to the file of the day it was
//! submitted on
//!
//! A client is acknowledged as soon as its record is queued. If the record later fails to be
//! written, the failure is logged by the worker and the record is dropped; it is never retried
//! and the client is never told.
//!
//! Shutting a pipeline down stops intake and waits for every record that was accepted to be
//! written before returning.
//!
//! ## Custom Protocol
//! The protocol is simply a "Submit" [`Request`] encoded to/from a JSON string, and then sent
//! over the wire using Rust's TcpStream library. The server stamps the submission with the
//! current time, queues it and answers with an "Ok" [`Response`]. A request that cannot be
//! parsed is answered with an [`Err`] response and never enters the pipeline.
//!
//! ## Partition Files
//! Records are kept in a base directory (`./feedback_files` by default) in files named after
//! the UTC date the record was submitted on, for example `feedback_2024-05-01.txt`.
//! Every line of a partition file is one JSON object:
//!
//! ```text
//! {"submitterID":"u1","content":"hello","submittedAt":"2024-05-01T10:00:00Z"}
//! ```
//!
//! Files are created on first use and are never rotated or deleted.
//!
//! [`feedback-server`]: ./feedback-server.rs
//! [`feedback-client`]: ./feedback-client.rs
//! [`Request`]: ./enum.Request.html
//! [`Response`]: ./enum.Response.html

pub use client::FeedbackClient;
pub use command::{Request, Response, ACK_MESSAGE};
pub use connection_pool::{ConnectionPool, DEFAULT_CONNECTION_THREADS};
pub use config::{PipelineConfig, DEFAULT_BASE_DIR, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
pub use error::{FeedbackError, PersistenceError, Result};
pub use pipeline::{Pipeline, Submitter};
pub use queue::{BoundedQueue, Delivery};
pub use record::{Record, Submission};
pub use server::{FeedbackServer, ShutdownHandle};
pub use worker_pool::WorkerPool;
pub use writer::{PartitionedWriter, RecordWriter};

mod client;
mod command;
mod config;
mod connection_pool;
mod error;
mod pipeline;
mod queue;
mod record;
mod server;
mod worker_pool;
pub mod writer;
