use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The caller supplied half of a feedback [`Record`].
///
/// A submission carries no timestamp. It only becomes a `Record` when the ingestion gateway
/// stamps it, right before it is handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// opaque id of whoever submitted the feedback
    #[serde(rename = "submitterID")]
    pub submitter_id: String,
    /// the feedback text
    pub content: String,
}

impl Submission {
    /// builder method to construct a new `Submission`
    pub fn new(submitter_id: impl Into<String>, content: impl Into<String>) -> Self {
        Submission {
            submitter_id: submitter_id.into(),
            content: content.into(),
        }
    }

    /// turns this submission into a [`Record`] submitted at the given instant
    pub fn stamp(self, submitted_at: DateTime<Utc>) -> Record {
        Record {
            submitter_id: self.submitter_id,
            content: self.content,
            submitted_at,
        }
    }

    /// turns this submission into a [`Record`] submitted right now
    pub fn stamp_now(self) -> Record {
        self.stamp(Utc::now())
    }
}

/// A single feedback item together with the time it was accepted.
///
/// Records are immutable once built. The `submitted_at` timestamp decides which day partition
/// the record is persisted into; nothing else in the pipeline looks at the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "submitterID")]
    submitter_id: String,
    content: String,
    #[serde(rename = "submittedAt")]
    submitted_at: DateTime<Utc>,
}

impl Record {
    /// creates a record from its parts
    pub fn new(
        submitter_id: impl Into<String>,
        content: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Submission::new(submitter_id, content).stamp(submitted_at)
    }

    /// id of whoever submitted this record
    pub fn submitter_id(&self) -> &str {
        &self.submitter_id
    }

    /// the feedback text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// the instant the record was accepted by the gateway
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// the calendar day (UTC) of the partition this record belongs to
    pub fn partition_date(&self) -> NaiveDate {
        self.submitted_at.date_naive()
    }
}
