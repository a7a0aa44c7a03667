use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::command::{Request, Response};
use crate::{FeedbackError, Result, Submission};

/// `FeedbackClient` contains the functionality for communication with a [`FeedbackServer`]
///
/// [`FeedbackServer`]: ./struct.FeedbackServer.html
pub struct FeedbackClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl FeedbackClient {
    /// creates a client and establishes a socket connection to the server at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(FeedbackClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// sends a piece of feedback to the server
    /// # Returns
    /// the server's acknowledgment message once the feedback was queued
    /// # Errors
    /// `Err<FeedbackError::StringErr>` if the server rejected the submission
    pub fn submit(&mut self, submission: Submission) -> Result<String> {
        let req = Request::Submit(submission);
        serde_json::to_writer(&mut self.writer, &req)?;
        self.writer.flush()?;

        match Response::deserialize(&mut self.reader)? {
            Response::Ok(message) => Ok(message),
            Response::Err(msg) => Err(FeedbackError::StringErr(msg)),
        }
    }
}
