//! Anchor Ledger.
//!
//! Cloud anchors outlive the session that created them: every anchor is
//! pinned with an expiration (three days by default), and a master that
//! restarts should know which of its anchors are still alive in which room
//! instead of littering the cloud with orphans.  The ledger persists exactly
//! what survives a restart (ids, room, sequence and layout) and
//! deliberately *not* poses, which are meaningless in a fresh world frame.
//!
//! # Storage layout
//!
//! A single table `anchor_records` is created (if it does not already exist)
//! with the following columns:
//!
//! | column     | type    | description                                  |
//! |------------|---------|----------------------------------------------|
//! | id         | TEXT    | Cloud-issued anchor identifier (primary key) |
//! | room       | TEXT    | Room the anchor set belongs to               |
//! | seq        | INTEGER | Position in the calibration set (0-based)    |
//! | x_leg      | REAL    | Advertised x-leg length in metres            |
//! | y_leg      | REAL    | Advertised y-leg length in metres            |
//! | created_at | TEXT    | RFC-3339 creation time (UTC)                 |
//! | expires_at | TEXT    | RFC-3339 cloud expiration time (UTC)         |
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use coframe_store::{AnchorLedger, AnchorRecord};
//! use coframe_types::AnchorId;
//!
//! let ledger = AnchorLedger::open_in_memory().unwrap();
//! let now = Utc::now();
//! let record = AnchorRecord {
//!     id: AnchorId::from("anchor-0"),
//!     room: "lab".to_string(),
//!     seq: 0,
//!     x_leg: 0.4,
//!     y_leg: 0.3,
//!     created_at: now,
//!     expires_at: now + Duration::days(3),
//! };
//! ledger.record(&record).unwrap();
//! assert_eq!(ledger.active_for_room("lab", now).unwrap().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use coframe_types::{AnchorId, ShareError};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid anchor record: {0}")]
    InvalidRecord(String),
}

impl From<LedgerError> for ShareError {
    fn from(err: LedgerError) -> Self {
        ShareError::Ledger(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AnchorRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A single persisted anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Cloud-issued identifier.
    pub id: AnchorId,
    /// Room the anchor set belongs to.
    pub room: String,
    /// Position of this anchor in the calibration set (0 = origin corner).
    pub seq: u8,
    /// Advertised x-leg length in metres.
    pub x_leg: f32,
    /// Advertised y-leg length in metres.
    pub y_leg: f32,
    /// Wall-clock time at which the anchor was created.
    pub created_at: DateTime<Utc>,
    /// Time at which the cloud forgets the anchor.
    pub expires_at: DateTime<Utc>,
}

impl AnchorRecord {
    /// Construct a record stamped with the current UTC time.
    pub fn new(
        id: AnchorId,
        room: impl Into<String>,
        seq: u8,
        x_leg: f32,
        y_leg: f32,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room: room.into(),
            seq,
            x_leg,
            y_leg,
            created_at: Utc::now(),
            expires_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AnchorLedger
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed record of the anchors this client has pinned.
pub struct AnchorLedger {
    conn: Connection,
}

impl AnchorLedger {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS anchor_records (
                id         TEXT NOT NULL PRIMARY KEY,
                room       TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                x_leg      REAL NOT NULL,
                y_leg      REAL NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist an [`AnchorRecord`], replacing any earlier record with the
    /// same id.
    pub fn record(&self, record: &AnchorRecord) -> Result<(), LedgerError> {
        if record.expires_at <= record.created_at {
            return Err(LedgerError::InvalidRecord(format!(
                "anchor {} expires at or before its creation",
                record.id
            )));
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO anchor_records
                 (id, room, seq, x_leg, y_leg, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.room,
                record.seq,
                record.x_leg,
                record.y_leg,
                record.created_at.to_rfc3339(),
                record.expires_at.to_rfc3339(),
            ],
        )?;
        debug!(anchor = %record.id, room = %record.room, seq = record.seq, "recorded anchor");
        Ok(())
    }

    /// Return the unexpired anchors recorded for `room`, ordered by sequence.
    pub fn active_for_room(
        &self,
        room: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnchorRecord>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room, seq, x_leg, y_leg, created_at, expires_at
             FROM anchor_records
             WHERE room = ?1
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![room], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if record.expires_at > now {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete every record whose expiration has passed and return how many
    /// were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, room, seq, x_leg, y_leg, created_at, expires_at FROM anchor_records")?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut expired = Vec::new();
        for row in rows {
            let record = row?;
            if record.expires_at <= now {
                expired.push(record.id);
            }
        }
        drop(stmt);

        for id in &expired {
            self.conn
                .execute("DELETE FROM anchor_records WHERE id = ?1", params![id.as_str()])?;
        }
        debug!(purged = expired.len(), "purged expired anchors");
        Ok(expired.len())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> Result<AnchorRecord, rusqlite::Error> {
        let id: String = row.get(0)?;
        let room: String = row.get(1)?;
        let seq: u8 = row.get(2)?;
        let x_leg: f32 = row.get(3)?;
        let y_leg: f32 = row.get(4)?;
        let created_str: String = row.get(5)?;
        let expires_str: String = row.get(6)?;

        let created_at = created_str.parse::<DateTime<Utc>>().map_err(|e| {
            rusqlite::Error::InvalidColumnType(5, e.to_string(), rusqlite::types::Type::Text)
        })?;
        let expires_at = expires_str.parse::<DateTime<Utc>>().map_err(|e| {
            rusqlite::Error::InvalidColumnType(6, e.to_string(), rusqlite::types::Type::Text)
        })?;

        Ok(AnchorRecord {
            id: AnchorId(id),
            room,
            seq,
            x_leg,
            y_leg,
            created_at,
            expires_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn rec(id: &str, room: &str, seq: u8, created: DateTime<Utc>, expires: DateTime<Utc>) -> AnchorRecord {
        AnchorRecord {
            id: AnchorId::from(id),
            room: room.to_string(),
            seq,
            x_leg: 0.4,
            y_leg: 0.3,
            created_at: created,
            expires_at: expires,
        }
    }

    #[test]
    fn record_and_fetch_ordered_by_seq() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        // Insert out of order.
        ledger.record(&rec("a-1", "lab", 1, ts(0), ts(10))).unwrap();
        ledger.record(&rec("a-0", "lab", 0, ts(0), ts(10))).unwrap();
        ledger.record(&rec("a-2", "lab", 2, ts(0), ts(10))).unwrap();

        let active = ledger.active_for_room("lab", ts(1)).unwrap();
        assert_eq!(active.len(), 3);
        assert_eq!(active[0].seq, 0);
        assert_eq!(active[1].seq, 1);
        assert_eq!(active[2].seq, 2);
    }

    #[test]
    fn expired_records_are_not_active() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        ledger.record(&rec("old", "lab", 0, ts(0), ts(2))).unwrap();
        ledger.record(&rec("new", "lab", 1, ts(0), ts(10))).unwrap();

        let active = ledger.active_for_room("lab", ts(5)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "new");
    }

    #[test]
    fn other_rooms_are_not_returned() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        ledger.record(&rec("a", "lab", 0, ts(0), ts(10))).unwrap();
        ledger.record(&rec("b", "garage", 0, ts(0), ts(10))).unwrap();

        let active = ledger.active_for_room("lab", ts(1)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].room, "lab");
    }

    #[test]
    fn purge_expired_deletes_and_counts() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        ledger.record(&rec("dead-1", "lab", 0, ts(0), ts(2))).unwrap();
        ledger.record(&rec("dead-2", "garage", 0, ts(0), ts(3))).unwrap();
        ledger.record(&rec("alive", "lab", 1, ts(0), ts(10))).unwrap();

        assert_eq!(ledger.purge_expired(ts(5)).unwrap(), 2);
        let remaining = ledger.active_for_room("lab", ts(1)).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_str(), "alive");

        // Nothing left to purge.
        assert_eq!(ledger.purge_expired(ts(5)).unwrap(), 0);
    }

    #[test]
    fn duplicate_id_replaced_on_record() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        ledger.record(&rec("a-0", "lab", 0, ts(0), ts(2))).unwrap();
        // Same id, pushed-out expiration.
        ledger.record(&rec("a-0", "lab", 0, ts(0), ts(10))).unwrap();

        let active = ledger.active_for_room("lab", ts(5)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].expires_at, ts(10));
    }

    #[test]
    fn record_expiring_before_creation_is_rejected() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        let err = ledger.record(&rec("bad", "lab", 0, ts(5), ts(5))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)));
    }

    #[test]
    fn empty_ledger_returns_empty_vec() {
        let ledger = AnchorLedger::open_in_memory().unwrap();
        assert!(ledger.active_for_room("lab", ts(0)).unwrap().is_empty());
    }

    #[test]
    fn ledger_error_converts_to_share_error() {
        let err = LedgerError::InvalidRecord("boom".to_string());
        let share: ShareError = err.into();
        assert!(matches!(share, ShareError::Ledger(_)));
    }
}
