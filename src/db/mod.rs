//! Database layer for unsc-ingest
//!
//! Handles SQLite persistence for meetings, resolutions and veto casts.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by concern:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`records`]: Unit-of-work writes and read-back queries
//!
//! Writers never talk to the pool directly: they open a [`UnitOfWork`]
//! through [`Persistence::begin`], stage entities with
//! [`UnitOfWork::upsert`], and either commit or roll back. A uniqueness
//! violation surfaces as [`Error::Conflict`](crate::Error::Conflict).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, sqlite::SqlitePool};

use crate::Result;

mod migrations;
mod records;

pub use records::SqliteUnitOfWork;

/// Permanent members of the Security Council, as stored in the `state` table
pub const PERMANENT_MEMBERS: [&str; 5] = ["USA", "UK", "France", "China", "Russia"];

/// Outcome of a vote on a draft
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// The draft became a resolution
    Adopted,
    /// A permanent member voted against
    Vetoed,
    /// The draft did not get enough votes
    NotAdopted,
}

impl ResolutionStatus {
    /// Value stored in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Adopted => "adopted",
            ResolutionStatus::Vetoed => "vetoed",
            ResolutionStatus::NotAdopted => "not adopted",
        }
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Security Council meeting
#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    /// Meeting record id (`S/PV.8697`)
    pub meeting_id: String,
    /// Year of the meeting
    pub year: i32,
    /// Free-form date text
    pub date: String,
    /// Agenda topic
    pub topic: String,
    /// Link to the transcript
    pub url: String,
    /// Transcript text
    pub full_text: String,
    /// At least one draft discussed in the meeting was vetoed
    pub veto_used_in_meeting: bool,
}

/// A draft and, when adopted, the resolution it became
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Draft id (`S/2019/961`), unique
    pub draft_id: String,
    /// Adopted resolution id (`S/RES/2516(2020)`)
    pub final_id: Option<String>,
    /// Link to the draft document
    pub draft_url: String,
    /// Link to the adopted resolution
    pub final_url: Option<String>,
    /// Vote outcome
    pub status: ResolutionStatus,
    /// Draft text
    pub draft_text: String,
    /// Adopted resolution text
    pub final_text: Option<String>,
    /// Year of the meeting that voted on it
    pub year: i32,
    /// Meeting that voted on it
    pub meeting_id: String,
}

/// One permanent member vetoing one draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoCast {
    /// Vetoed draft id
    pub draft_id: String,
    /// Name of the vetoing state, one of [`PERMANENT_MEMBERS`]
    pub state: String,
}

/// Anything a unit of work can write
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Inserted, or updated when the meeting is already stored
    Meeting(Meeting),
    /// Inserted; conflicts when the draft is already stored
    Resolution(Resolution),
    /// Inserted; conflicts when the cast is already stored
    VetoCast(VetoCast),
}

impl From<Meeting> for Entity {
    fn from(meeting: Meeting) -> Self {
        Entity::Meeting(meeting)
    }
}

impl From<Resolution> for Entity {
    fn from(resolution: Resolution) -> Self {
        Entity::Resolution(resolution)
    }
}

impl From<VetoCast> for Entity {
    fn from(cast: VetoCast) -> Self {
        Entity::VetoCast(cast)
    }
}

/// Meeting record from database
#[derive(Debug, Clone, FromRow)]
pub struct MeetingRow {
    /// Meeting record id
    pub meeting_id: String,
    /// Agenda topic
    pub topic: Option<String>,
    /// Transcript text
    pub full_text: Option<String>,
    /// Link to the transcript
    pub url: Option<String>,
    /// Free-form date text
    pub date: Option<String>,
    /// Year of the meeting
    pub year: Option<i64>,
    /// Whether a veto was cast in the meeting
    pub veto_used_in_meeting: bool,
}

/// Resolution record from database
#[derive(Debug, Clone, FromRow)]
pub struct ResolutionRow {
    /// Unique database ID
    pub id: i64,
    /// Draft id
    pub draft_id: String,
    /// Adopted resolution id
    pub final_id: Option<String>,
    /// Link to the draft document
    pub draft_url: Option<String>,
    /// Link to the adopted resolution
    pub final_url: Option<String>,
    /// `adopted`, `vetoed` or `not adopted`
    pub status: String,
    /// Draft text
    pub draft_text: Option<String>,
    /// Adopted resolution text
    pub final_text: Option<String>,
    /// Year of the meeting that voted on it
    pub year: Option<i64>,
    /// Meeting that voted on it
    pub meeting_id: Option<String>,
}

/// Opens units of work against a store
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Start a unit of work; nothing is visible to others until it commits
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// A transaction-scoped batch of writes
///
/// Dropping an uncommitted unit of work discards its writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Stage an entity
    ///
    /// # Errors
    /// [`Error::Conflict`](crate::Error::Conflict) when the entity violates a
    /// uniqueness constraint.
    async fn upsert(&mut self, entity: Entity) -> Result<()>;

    /// Make the staged writes permanent
    async fn commit(&mut self) -> Result<()>;

    /// Discard the staged writes; a no-op once the unit is finished
    async fn rollback(&mut self) -> Result<()>;
}

/// Database handle for unsc-ingest
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
