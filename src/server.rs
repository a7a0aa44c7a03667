use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Deserializer;
use tracing::{debug, error, info, warn};

use crate::command::{Request, Response, ACK_MESSAGE};
use crate::connection_pool::{ConnectionPool, DEFAULT_CONNECTION_THREADS};
use crate::{FeedbackError, Result, Submitter};

/// A TCP socket server that feeds submissions into a [`Pipeline`](crate::Pipeline).
///
/// It listens for incoming [`Request`]s, stamps every submission with the current time, hands it
/// to the pipeline and acknowledges the client. The acknowledgment only waits for the record to
/// be queued, not for it to be written. Connections are served on a fixed size
/// [`ConnectionPool`]; when all of its threads are busy the server stops accepting until one
/// frees up.
///
/// # Example
/// Run a server on "127.0.0.1:8080" in front of a pipeline with the default settings
/// ```rust
/// use feedback::{FeedbackServer, Pipeline, PipelineConfig};
/// # fn main() -> feedback::Result<()> {
/// let pipeline = Pipeline::open(PipelineConfig::default())?;
/// let server = FeedbackServer::bind("127.0.0.1:8080", pipeline.submitter())?;
/// // server.run()?;
/// # Ok(())
/// # }
/// ```
///
/// [`Request`]: ./enum.Request.html
pub struct FeedbackServer {
    listener: TcpListener,
    submitter: Submitter,
    pool: ConnectionPool,
    stopped: Arc<AtomicBool>,
}

impl FeedbackServer {
    /// binds a listener on `addr`. Submissions received by the server go to `submitter`.
    /// Connections are served by [`DEFAULT_CONNECTION_THREADS`] threads.
    pub fn bind<A: ToSocketAddrs>(addr: A, submitter: Submitter) -> Result<Self> {
        FeedbackServer::bind_with(addr, submitter, DEFAULT_CONNECTION_THREADS)
    }

    /// binds a listener on `addr`, serving at most `connection_threads` clients at a time
    pub fn bind_with<A: ToSocketAddrs>(
        addr: A,
        submitter: Submitter,
        connection_threads: usize,
    ) -> Result<Self> {
        let pool = ConnectionPool::new(connection_threads)?;
        let listener = TcpListener::bind(addr)?;
        Ok(FeedbackServer {
            listener,
            submitter,
            pool,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// the address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// returns a handle that can stop [`FeedbackServer::run`] from another thread
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            addr: self.local_addr()?,
            stopped: Arc::clone(&self.stopped),
        })
    }

    /// Accepts connections until stopped through a [`ShutdownHandle`].
    ///
    /// Connections that are already being served keep running after this returns. While every
    /// connection thread is busy, a shutdown only takes effect once one of them frees up.
    pub fn run(self) -> Result<()> {
        info!("listening on {}", self.local_addr()?);
        for stream in self.listener.incoming() {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let submitter = self.submitter.clone();
                    let spawned = self.pool.spawn(move || {
                        if let Err(e) = serve(submitter, stream) {
                            error!("Error on serving client: {}", e);
                        }
                    });
                    if let Err(e) = spawned {
                        error!("Failed to hand the connection to a thread: {}", e);
                    }
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        info!("server stopped accepting connections");
        Ok(())
    }
}

/// Stops a running [`FeedbackServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    addr: SocketAddr,
    stopped: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// flags the server as stopped and wakes up its accept loop
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // the accept loop only notices the flag once another connection comes in
        if let Err(e) = TcpStream::connect(self.addr) {
            warn!("could not wake up the server at {}: {}", self.addr, e);
        }
    }
}

/// Reads [`Request`]s from the given `tcp` stream until the client disconnects, submitting each
/// one into the pipeline and answering with a [`Response`].
///
/// A request that cannot be parsed is answered with an error and ends the connection; nothing
/// from it is submitted.
fn serve(submitter: Submitter, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    let stream_reader = BufReader::new(&tcp);
    let mut stream_writer = BufWriter::new(&tcp);
    let req_reader = Deserializer::from_reader(stream_reader).into_iter::<Request>();

    let mut send_resp = move |resp: Response| -> Result<()> {
        serde_json::to_writer(&mut stream_writer, &resp)?;
        stream_writer.flush()?;
        debug!("Response sent to {}: {:?}", peer_addr, resp);
        Ok(())
    };

    for req in req_reader {
        let req = match req {
            Ok(req) => req,
            Err(e) => {
                let err = FeedbackError::Ingestion(e.to_string());
                warn!("Malformed request from {}: {}", peer_addr, e);
                return send_resp(Response::Err(err.to_string()));
            }
        };
        debug!("Receive request from {}: {:?}", peer_addr, req);

        match req {
            Request::Submit(submission) => {
                let record = submission.stamp_now();
                match submitter.submit(record) {
                    Ok(()) => send_resp(Response::Ok(ACK_MESSAGE.to_string()))?,
                    Err(e) => send_resp(Response::Err(e.to_string()))?,
                }
            }
        }
    }
    Ok(())
}
