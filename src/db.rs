//! Database module for ridebot
//!
//! Provides persistence for rides, their tracked chat messages and
//! participation. Every public operation runs under the connection lock,
//! and multi-statement writes run in one transaction, so a ride is always
//! replaced as a whole and a user is never in two participation sets.

mod schema;

pub use schema::SCHEMA;
use schema::RIDE_COLUMNS;

use crate::ride::{
    MessageHandle, Participant, Participation, ParticipationState, Ride, RideCategory,
    RideDetails, UserProfile,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Ride not found: {0}")]
    RideNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// One page of rides plus the total number of matching rides
#[derive(Debug, Clone, PartialEq)]
pub struct RidePage {
    pub rides: Vec<Ride>,
    pub total: u64,
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves no partial transaction behind
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Ride Operations ====================

    /// Insert a new ride together with its messages and participation
    pub fn insert_ride(&self, ride: &Ride) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let d = &ride.details;

        tx.execute(
            &format!(
                "INSERT INTO rides ({RIDE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                ride.id,
                d.title,
                d.category.key(),
                d.organizer,
                format_datetime(d.date),
                d.meeting_point,
                d.route_link,
                d.distance_km,
                d.duration_min,
                d.speed_min,
                d.speed_max,
                d.info,
                ride.cancelled,
                ride.created_by,
                ride.updated_by,
                format_datetime(ride.created_at),
                format_datetime(ride.updated_at),
            ],
        )?;
        write_messages(&tx, &ride.id, &ride.messages)?;
        for state in ParticipationState::ALL {
            for participant in ride.participation.set(state) {
                upsert_participant(&tx, &ride.id, &participant.profile, state, participant.updated_at)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a ride with its messages and participation
    pub fn get_ride(&self, id: &str) -> DbResult<Ride> {
        let conn = self.conn();
        load_ride(&conn, id)
    }

    /// Replace all user-editable details of a ride in one statement
    pub fn replace_ride_details(
        &self,
        id: &str,
        details: &RideDetails,
        updated_by: i64,
    ) -> DbResult<Ride> {
        let conn = self.conn();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE rides SET title = ?1, category = ?2, organizer = ?3, date = ?4,
                    meeting_point = ?5, route_link = ?6, distance_km = ?7, duration_min = ?8,
                    speed_min = ?9, speed_max = ?10, info = ?11, updated_by = ?12, updated_at = ?13
             WHERE id = ?14",
            params![
                details.title,
                details.category.key(),
                details.organizer,
                format_datetime(details.date),
                details.meeting_point,
                details.route_link,
                details.distance_km,
                details.duration_min,
                details.speed_min,
                details.speed_max,
                details.info,
                updated_by,
                format_datetime(now),
                id,
            ],
        )?;

        if updated == 0 {
            return Err(DbError::RideNotFound(id.to_string()));
        }
        load_ride(&conn, id)
    }

    /// Mark a ride cancelled or active again
    pub fn set_cancelled(&self, id: &str, cancelled: bool, updated_by: i64) -> DbResult<Ride> {
        let conn = self.conn();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE rides SET cancelled = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
            params![cancelled, updated_by, format_datetime(now), id],
        )?;

        if updated == 0 {
            return Err(DbError::RideNotFound(id.to_string()));
        }
        load_ride(&conn, id)
    }

    /// Delete a ride, its messages and its participation
    pub fn delete_ride(&self, id: &str) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM participants WHERE ride_id = ?1", params![id])?;
        tx.execute("DELETE FROM ride_messages WHERE ride_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM rides WHERE id = ?1", params![id])?;

        if deleted == 0 {
            return Err(DbError::RideNotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Rides created by a user, newest ride date first
    pub fn list_rides_by_creator(&self, user_id: i64, skip: u64, limit: u64) -> DbResult<RidePage> {
        let conn = self.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rides WHERE created_by = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id FROM rides WHERE created_by = ?1
             ORDER BY date DESC, created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let ids = stmt
            .query_map(
                params![
                    user_id,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(skip).unwrap_or(i64::MAX)
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let rides = ids
            .iter()
            .map(|id| load_ride(&conn, id))
            .collect::<DbResult<Vec<_>>>()?;

        Ok(RidePage {
            rides,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    // ==================== Message Handle Operations ====================

    /// Append a tracked message to a ride
    pub fn add_ride_message(&self, id: &str, handle: MessageHandle) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        ensure_ride_exists(&tx, id)?;

        let position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM ride_messages WHERE ride_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO ride_messages (ride_id, position, chat_id, message_id, thread_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, position, handle.chat_id, handle.message_id, handle.thread_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the tracked messages of a ride
    pub fn replace_ride_messages(&self, id: &str, handles: &[MessageHandle]) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        ensure_ride_exists(&tx, id)?;

        tx.execute("DELETE FROM ride_messages WHERE ride_id = ?1", params![id])?;
        write_messages(&tx, id, handles)?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Participation Operations ====================

    /// Put a user into exactly one participation set.
    ///
    /// Returns whether the user's state changed.
    pub fn set_participation(
        &self,
        ride_id: &str,
        profile: &UserProfile,
        state: ParticipationState,
    ) -> DbResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        ensure_ride_exists(&tx, ride_id)?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT state FROM participants WHERE ride_id = ?1 AND user_id = ?2",
                params![ride_id, profile.user_id],
                |row| row.get(0),
            )
            .optional()?;

        // The (ride_id, user_id) key replaces any earlier membership
        upsert_participant(&tx, ride_id, profile, state, Utc::now())?;
        tx.commit()?;

        Ok(previous.as_deref() != Some(state.as_str()))
    }

    /// Current participation of a ride
    pub fn get_participation(&self, ride_id: &str) -> DbResult<Participation> {
        let conn = self.conn();
        ensure_ride_exists(&conn, ride_id)?;
        load_participation(&conn, ride_id)
    }
}

fn ensure_ride_exists(conn: &Connection, id: &str) -> DbResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM rides WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(DbError::RideNotFound(id.to_string()))
    }
}

fn load_ride(conn: &Connection, id: &str) -> DbResult<Ride> {
    let mut ride = conn
        .query_row(
            &format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = ?1"),
            params![id],
            parse_ride_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::RideNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })?;
    ride.messages = load_messages(conn, id)?;
    ride.participation = load_participation(conn, id)?;
    Ok(ride)
}

fn load_messages(conn: &Connection, ride_id: &str) -> DbResult<Vec<MessageHandle>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, message_id, thread_id FROM ride_messages
         WHERE ride_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![ride_id], |row| {
        Ok(MessageHandle::new(row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

fn load_participation(conn: &Connection, ride_id: &str) -> DbResult<Participation> {
    let mut stmt = conn.prepare(
        "SELECT user_id, state, username, first_name, last_name, updated_at
         FROM participants WHERE ride_id = ?1 ORDER BY updated_at ASC, user_id ASC",
    )?;
    let rows = stmt.query_map(params![ride_id], |row| {
        let state: String = row.get(1)?;
        let participant = Participant {
            profile: UserProfile {
                user_id: row.get(0)?,
                username: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
            },
            updated_at: parse_datetime(&row.get::<_, String>(5)?),
        };
        Ok((state, participant))
    })?;

    let mut participation = Participation::default();
    for row in rows {
        let (state, participant) = row?;
        match ParticipationState::parse(&state) {
            Some(state) => participation.set_mut(state).push(participant),
            None => tracing::warn!(ride_id, state = %state, "Skipping participant with unknown state"),
        }
    }
    Ok(participation)
}

fn write_messages(conn: &Connection, ride_id: &str, handles: &[MessageHandle]) -> DbResult<()> {
    for (position, handle) in handles.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO ride_messages (ride_id, position, chat_id, message_id, thread_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ride_id,
                i64::try_from(position).unwrap_or(i64::MAX),
                handle.chat_id,
                handle.message_id,
                handle.thread_id
            ],
        )?;
    }
    Ok(())
}

fn upsert_participant(
    conn: &Connection,
    ride_id: &str,
    profile: &UserProfile,
    state: ParticipationState,
    at: DateTime<Utc>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO participants (ride_id, user_id, state, username, first_name, last_name, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(ride_id, user_id) DO UPDATE SET
            state = excluded.state,
            username = excluded.username,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            updated_at = CASE WHEN participants.state = excluded.state
                              THEN participants.updated_at ELSE excluded.updated_at END",
        params![
            ride_id,
            profile.user_id,
            state.as_str(),
            profile.username,
            profile.first_name,
            profile.last_name,
            format_datetime(at),
        ],
    )?;
    Ok(())
}

/// Parse a ride row; messages and participation are loaded separately
fn parse_ride_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ride> {
    let category: String = row.get(2)?;
    Ok(Ride {
        id: row.get(0)?,
        details: RideDetails {
            title: row.get(1)?,
            category: RideCategory::parse(&category).unwrap_or_default(),
            organizer: row.get(3)?,
            date: parse_datetime(&row.get::<_, String>(4)?),
            meeting_point: row.get(5)?,
            route_link: row.get(6)?,
            distance_km: row.get(7)?,
            duration_min: row.get(8)?,
            speed_min: row.get(9)?,
            speed_max: row.get(10)?,
            info: row.get(11)?,
        },
        cancelled: row.get(12)?,
        created_by: row.get(13)?,
        updated_by: row.get(14)?,
        created_at: parse_datetime(&row.get::<_, String>(15)?),
        updated_at: parse_datetime(&row.get::<_, String>(16)?),
        messages: Vec::new(),
        participation: Participation::default(),
    })
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
