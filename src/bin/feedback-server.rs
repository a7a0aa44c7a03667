//! this binary starts the feedback server
//! to see the list of options, type: `feedback-server --help`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::{crate_version, App, Arg};
use feedback::{
    FeedbackError, FeedbackServer, Pipeline, PipelineConfig, Result, DEFAULT_BASE_DIR,
    DEFAULT_CONNECTION_THREADS,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    config: PipelineConfig,
    // threads serving client connections
    connections: usize,
}

impl Opt {
    /// validates the command line parameters
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`FeedbackError::Parsing`] if one of the parameters is invalid
    ///
    fn build(addr: &str, dir: &str, workers: &str, capacity: &str, connections: &str) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            FeedbackError::Parsing(format!(
                "could not parse {} into an IP address and port",
                &addr
            ))
        })?;
        let workers: usize = workers.parse().map_err(|_| {
            FeedbackError::Parsing(format!("workers must be a positive integer, got {}", workers))
        })?;
        let capacity: usize = capacity.parse().map_err(|_| {
            FeedbackError::Parsing(format!("capacity must be a positive integer, got {}", capacity))
        })?;
        let connections: usize = match connections.parse() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(FeedbackError::Parsing(format!(
                    "connections must be a positive integer, got {}",
                    connections
                )))
            }
        };

        let config = PipelineConfig::default()
            .with_base_dir(PathBuf::from(dir))
            .with_workers(workers)
            .with_queue_capacity(capacity);
        config.validate()?;

        Ok(Opt { addr, config, connections })
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let default_workers = feedback::DEFAULT_WORKERS.to_string();
    let default_capacity = feedback::DEFAULT_QUEUE_CAPACITY.to_string();
    let default_connections = DEFAULT_CONNECTION_THREADS.to_string();
    let matches = App::new("feedback-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("accepts feedback and records it into day partitioned files")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("dir")
            .long("dir")
            .value_name("PATH")
            .help("sets the directory the feedback files are written to")
            .default_value(DEFAULT_BASE_DIR))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("N")
            .help("sets the number of worker threads writing feedback")
            .default_value(&default_workers))
        .arg(Arg::with_name("capacity")
            .long("capacity")
            .value_name("N")
            .help("sets how many feedback items are buffered before clients are blocked")
            .default_value(&default_capacity))
        .arg(Arg::with_name("connections")
            .long("connections")
            .value_name("N")
            .help("sets the number of threads serving client connections")
            .default_value(&default_connections))
        .get_matches();

    // all five arguments have default values
    let opt = match Opt::build(
        matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS),
        matches.value_of("dir").unwrap_or(DEFAULT_BASE_DIR),
        matches.value_of("workers").unwrap_or(&default_workers),
        matches.value_of("capacity").unwrap_or(&default_capacity),
        matches.value_of("connections").unwrap_or(&default_connections),
    ) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("feedback-server {}", env!("CARGO_PKG_VERSION"));
    info!("Feedback directory: {:?}", opt.config.base_dir);

    let pipeline = Pipeline::open(opt.config)?;
    let server = FeedbackServer::bind_with(opt.addr, pipeline.submitter(), opt.connections)?;

    // SIGINT and SIGTERM stop the accept loop, so the pipeline below gets drained
    let handle = server.shutdown_handle()?;
    ctrlc::set_handler(move || {
        info!("shutdown signal received, draining feedback");
        handle.shutdown();
    })
    .map_err(|e| FeedbackError::StringErr(format!("could not install signal handler: {}", e)))?;

    let served = server.run();

    // wait for every accepted feedback item to be written
    pipeline.shutdown();
    served
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level of INFO or higher will be written
        .with_max_level(Level::INFO)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
