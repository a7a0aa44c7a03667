use serde::{Deserialize, Serialize};

use crate::Submission;

/// the message returned to a client once its feedback was accepted
pub const ACK_MESSAGE: &str = "Feedback received successfully";

/// These are the requests a client can send to the feedback server
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    /// submit a piece of feedback. The server assigns the timestamp.
    Submit(Submission),
}

/// The response Types that can be returned for any feedback Request
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    /// this variant is returned when the feedback was queued for writing
    Ok(String),
    /// this variant is returned if the request could not be accepted
    Err(String),
}
