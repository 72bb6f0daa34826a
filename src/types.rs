//! Core types for unsc-ingest

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One retryable task
///
/// A unit starts at attempt 1 and is owned by a [`RetryQueue`](crate::queue::RetryQueue)
/// from the moment it is enqueued. Only the queue bumps `attempts` and sets
/// `complete`; processing functions receive a copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    description: String,
    attempts: u32,
    complete: bool,
    payload: Payload,
}

/// Task-specific data carried by a [`WorkUnit`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Retrieve a page and store it verbatim
    Fetch(FetchTask),
    /// Reconcile one meeting record and persist its entities
    Record(RecordTask),
}

/// A page or document to retrieve and persist verbatim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTask {
    /// Where to fetch from
    pub url: String,
    /// Where to write the body
    pub destination: PathBuf,
}

/// One upstream meeting to reconcile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTask {
    /// The record as extracted from a meeting table
    pub record: MeetingRecord,
}

/// A row of a yearly meeting table
///
/// ```text
/// meeting_record: S/PV.8697
/// meeting_url:    https://undocs.org/en/S/PV.8697
/// date:           20 December
/// topic:          The situation in the Middle East
/// outcome:        Draft resolution S/2019/961 vetoed by Russian Federation and China ...
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    /// Meeting record id (`S/PV.8697`)
    pub meeting_record: String,
    /// Link to the meeting transcript
    pub meeting_url: String,
    /// Year of the table the row came from
    pub year: i32,
    /// Free-form date text
    pub date: String,
    /// Agenda topic
    pub topic: String,
    /// Outcome / vote text, mentions the drafts and resolutions
    pub outcome: String,
}

impl WorkUnit {
    /// Create a unit with an explicit description
    pub fn new(description: impl Into<String>, payload: Payload) -> Self {
        Self {
            description: description.into(),
            attempts: 1,
            complete: false,
            payload,
        }
    }

    /// Create a fetch unit
    pub fn fetch(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            description,
            Payload::Fetch(FetchTask {
                url: url.into(),
                destination: destination.into(),
            }),
        )
    }

    /// Create a record unit described by its meeting id and year
    pub fn record(record: MeetingRecord) -> Self {
        let description = format!("meeting {} ({})", record.meeting_record.trim(), record.year);
        Self::new(description, Payload::Record(RecordTask { record }))
    }

    /// Stable description used for logging and identity
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Human-readable summary including the payload
    pub fn info(&self) -> String {
        match &self.payload {
            Payload::Fetch(task) => format!(
                "{} from {} to {}",
                self.description,
                task.url,
                task.destination.display()
            ),
            Payload::Record(task) => task.record.meeting_record.trim().to_string(),
        }
    }

    /// Attempt number of the next (or current) run, starting at 1
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once a processing function returned successfully
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The task payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the unit, keeping only its payload
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub(crate) fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (attempt {}, complete: {})",
            self.description, self.attempts, self.complete
        )
    }
}

/// Counters describing a queue at one moment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Units waiting to be processed
    pub pending: usize,
    /// Units currently held by a worker
    pub in_flight: usize,
    /// Units that completed successfully
    pub completed: usize,
    /// Units in the terminal-failure collection
    pub failed: usize,
}

/// Event emitted by a [`RetryQueue`](crate::queue::RetryQueue) while draining
#[derive(Clone, Debug)]
pub enum QueueEvent {
    /// A unit was dequeued and handed to the processing function
    Started {
        /// Unit description
        description: String,
        /// Attempt number about to run
        attempt: u32,
    },
    /// A unit finished successfully; carries the completed unit
    Completed {
        /// The unit, with `complete` set
        unit: WorkUnit,
    },
    /// A unit failed and went back to the tail of the queue
    Requeued {
        /// Unit description
        description: String,
        /// Attempt number of the next run
        attempts: u32,
        /// Error message of the failed run
        error: String,
    },
    /// A unit exhausted its retries, or failed fatally
    Failed {
        /// Unit description
        description: String,
        /// Final attempt counter
        attempts: u32,
        /// Error message of the last run
        error: String,
    },
}
