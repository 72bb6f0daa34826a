//! Unit-of-work writes and read-back queries.

use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{
    Database, Entity, Meeting, MeetingRow, PERMANENT_MEMBERS, Persistence, Resolution,
    ResolutionRow, UnitOfWork, VetoCast,
};

/// Map a failed statement, turning uniqueness violations into conflicts
fn query_error(context: &str, e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return Error::Conflict(format!("{}: {}", context, db_err));
        }
    }
    Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Insert the permanent members into the `state` table
    ///
    /// Members already present are left alone, so this is safe on every run.
    pub async fn seed_states(&self) -> Result<()> {
        for name in PERMANENT_MEMBERS {
            sqlx::query("INSERT INTO state (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| query_error("Failed to seed states", e))?;
        }
        tracing::debug!(states = PERMANENT_MEMBERS.len(), "Seeded state table");
        Ok(())
    }

    /// Names in the `state` table, in insertion order
    pub async fn states(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM state ORDER BY state_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("Failed to list states", e))
    }

    /// Get a meeting by its record id
    pub async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingRow>> {
        sqlx::query_as::<_, MeetingRow>(
            r#"
            SELECT meeting_id, topic, full_text, url, date, year, veto_used_in_meeting
            FROM meeting WHERE meeting_id = ?
            "#,
        )
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to get meeting", e))
    }

    /// Get a resolution by its draft id
    pub async fn get_resolution(&self, draft_id: &str) -> Result<Option<ResolutionRow>> {
        sqlx::query_as::<_, ResolutionRow>(
            r#"
            SELECT id, draft_id, final_id, draft_url, final_url, status,
                   draft_text, final_text, year, meeting_id
            FROM resolution WHERE draft_id = ?
            "#,
        )
        .bind(draft_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to get resolution", e))
    }

    /// Resolutions voted on in a meeting, ordered by draft id
    pub async fn resolutions_for_meeting(&self, meeting_id: &str) -> Result<Vec<ResolutionRow>> {
        sqlx::query_as::<_, ResolutionRow>(
            r#"
            SELECT id, draft_id, final_id, draft_url, final_url, status,
                   draft_text, final_text, year, meeting_id
            FROM resolution WHERE meeting_id = ? ORDER BY draft_id
            "#,
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list resolutions", e))
    }

    /// States that vetoed a draft, ordered by name
    pub async fn veto_casters(&self, draft_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT s.name FROM vetocasts v
            JOIN state s ON s.state_id = v.state_id
            WHERE v.vetoed_resolution = ?
            ORDER BY s.name
            "#,
        )
        .bind(draft_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list veto casters", e))
    }
}

#[async_trait]
impl Persistence for Database {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin unit of work", e))?;
        Ok(Box::new(SqliteUnitOfWork { tx: Some(tx) }))
    }
}

/// SQLite transaction behind a [`UnitOfWork`]
pub struct SqliteUnitOfWork {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteUnitOfWork {
    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        let tx = self
            .tx
            .as_mut()
            .ok_or(Error::Database(DatabaseError::Finished))?;
        Ok(&mut **tx)
    }
}

async fn upsert_meeting(conn: &mut SqliteConnection, meeting: &Meeting) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meeting (meeting_id, topic, full_text, url, date, year, veto_used_in_meeting)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(meeting_id) DO UPDATE SET
            topic = excluded.topic,
            full_text = excluded.full_text,
            url = excluded.url,
            date = excluded.date,
            year = excluded.year,
            veto_used_in_meeting = MAX(meeting.veto_used_in_meeting, excluded.veto_used_in_meeting)
        "#,
    )
    .bind(&meeting.meeting_id)
    .bind(&meeting.topic)
    .bind(&meeting.full_text)
    .bind(&meeting.url)
    .bind(&meeting.date)
    .bind(meeting.year)
    .bind(meeting.veto_used_in_meeting)
    .execute(&mut *conn)
    .await
    .map_err(|e| query_error(&format!("Failed to upsert meeting '{}'", meeting.meeting_id), e))?;
    Ok(())
}

async fn insert_resolution(conn: &mut SqliteConnection, resolution: &Resolution) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO resolution (
            draft_id, final_id, draft_url, final_url, status,
            draft_text, final_text, year, meeting_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&resolution.draft_id)
    .bind(&resolution.final_id)
    .bind(&resolution.draft_url)
    .bind(&resolution.final_url)
    .bind(resolution.status.as_str())
    .bind(&resolution.draft_text)
    .bind(&resolution.final_text)
    .bind(resolution.year)
    .bind(&resolution.meeting_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        query_error(
            &format!("Failed to insert resolution '{}'", resolution.draft_id),
            e,
        )
    })?;
    Ok(())
}

async fn insert_veto_cast(conn: &mut SqliteConnection, cast: &VetoCast) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO vetocasts (vetoed_resolution, state_id)
        SELECT ?, state_id FROM state WHERE name = ?
        "#,
    )
    .bind(&cast.draft_id)
    .bind(&cast.state)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        query_error(
            &format!("Failed to insert veto by '{}' on '{}'", cast.state, cast.draft_id),
            e,
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(Error::DataInconsistency(format!(
            "'{}' vetoed '{}' but is not a known permanent member",
            cast.state, cast.draft_id
        )));
    }
    Ok(())
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn upsert(&mut self, entity: Entity) -> Result<()> {
        let conn = self.connection()?;
        match &entity {
            Entity::Meeting(meeting) => upsert_meeting(conn, meeting).await,
            Entity::Resolution(resolution) => insert_resolution(conn, resolution).await,
            Entity::VetoCast(cast) => insert_veto_cast(conn, cast).await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or(Error::Database(DatabaseError::Finished))?;
        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit unit of work", e))
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| query_error("Failed to roll back unit of work", e)),
            None => Ok(()),
        }
    }
}
