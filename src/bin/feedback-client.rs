//! The feedback-client executable supports the following command line arguments:
//!
//! `feedback-client submit <SUBMITTER_ID> <CONTENT> [--addr IP-PORT]`
//!
//!     Submit a piece of feedback to the server.
//!     --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT. If --addr is not specified then connect on 127.0.0.1:8080.
//!     Print an error and return a non-zero exit code on server error, or if IP-PORT does not parse as an address.
//!
//! `feedback-client -V`
//!
//!     Print the version.

use std::net::SocketAddr;
use std::process::exit;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use feedback::{FeedbackClient, FeedbackError, Result, Submission};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    submission: Submission,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`FeedbackError::Parsing`] if one of the parameters is invalid
    ///
    fn build(args: &ArgMatches) -> Result<Opt> {
        let addr = args.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
        let addr: SocketAddr = addr.parse().map_err(|_| {
            FeedbackError::Parsing(format!(
                "could not parse {} into an IP address and port",
                &addr
            ))
        })?;
        // both positional arguments are required by clap
        let submitter_id = args.value_of("SUBMITTER_ID").unwrap_or_default();
        let content = args.value_of("CONTENT").unwrap_or_default();

        Ok(Opt {
            addr,
            submission: Submission::new(submitter_id, content),
        })
    }
}

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let matches = App::new("feedback-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("submits feedback to a feedback-server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("submit")
                .about("Submit a piece of feedback")
                .arg(Arg::with_name("SUBMITTER_ID").required(true).index(1))
                .arg(Arg::with_name("CONTENT").required(true).index(2))
                .arg(Arg::with_name("addr")
                    .long("addr")
                    .value_name("IP_ADDR:PORT")
                    .help("the IP_ADDR:PORT of the feedback server")
                    .default_value(DEFAULT_ADDRESS)),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("submit", Some(args)) => Opt::build(args).and_then(submit),
        _ => Err(FeedbackError::Parsing("unknown command received".to_string())),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1);
    }
}

fn submit(opt: Opt) -> Result<()> {
    debug!(?opt);
    let mut client = FeedbackClient::connect(opt.addr)?;
    let message = client.submit(opt.submission)?;
    println!("{}", message);
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
