//! SQLite-based storage for the member directory and partnership ledger.
//!
//! All two-member pointer commits run inside a single transaction so a
//! member can never be double-booked into two simultaneous partnerships.
//! Ledger records are append-only: superseded pairings are deactivated,
//! never deleted.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use crate::error::StorageError;
use crate::ledger::{PairingSource, PartnershipRecord};
use crate::member::{Member, MemberId};

/// An active pairing as exposed to read-only callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivePair {
    pub member1_id: MemberId,
    pub member1_name: String,
    pub member2_id: MemberId,
    pub member2_name: String,
    pub week_number: u32,
    pub year: i32,
    pub notes: PairingSource,
}

/// SQLite database holding members and the partnership ledger.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/duos/duos.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?
            .join("duos.db");
        Self::open_at(&path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS members (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                joined_at           TEXT NOT NULL,
                current_partner_id  TEXT,
                paired_this_week    INTEGER NOT NULL DEFAULT 0,
                last_paired_with_id TEXT
            );

            CREATE TABLE IF NOT EXISTS partnerships (
                id          TEXT PRIMARY KEY,
                member1_id  TEXT NOT NULL,
                member2_id  TEXT NOT NULL,
                week_number INTEGER NOT NULL,
                year        INTEGER NOT NULL,
                pair_date   TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                notes       TEXT NOT NULL DEFAULT 'automatic'
            );

            -- The same unordered pair cannot be recorded twice for one week
            CREATE UNIQUE INDEX IF NOT EXISTS idx_partnerships_pair_week
                ON partnerships(member1_id, member2_id, week_number, year);

            CREATE INDEX IF NOT EXISTS idx_partnerships_pair_date ON partnerships(pair_date);
            CREATE INDEX IF NOT EXISTS idx_partnerships_active ON partnerships(is_active);
            CREATE INDEX IF NOT EXISTS idx_members_unpaired ON members(current_partner_id);",
        )?;
        Ok(())
    }

    // === Member directory ===

    /// Insert a member into the directory.
    pub fn insert_member(&self, member: &Member) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO members (id, name, joined_at, current_partner_id, paired_this_week, last_paired_with_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                member.id,
                member.name,
                member.joined_at.to_rfc3339(),
                member.current_partner_id,
                member.paired_this_week,
                member.last_paired_with_id,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single member by id.
    pub fn get_member(&self, id: &str) -> Result<Option<Member>, StorageError> {
        let member = self
            .conn
            .query_row(
                "SELECT id, name, joined_at, current_partner_id, paired_this_week, last_paired_with_id
                 FROM members WHERE id = ?1",
                params![id],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    /// Snapshot of the full member pool.
    pub fn list_members(&self) -> Result<Vec<Member>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, joined_at, current_partner_id, paired_this_week, last_paired_with_id
             FROM members ORDER BY joined_at",
        )?;
        let rows = stmt.query_map([], member_from_row)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Members with no current partner, oldest joiner first, optionally
    /// excluding one id. Ordering matters: the immediate pairer picks the
    /// head of this list as the longest-unpaired candidate.
    pub fn unpaired_members(&self, exclude: Option<&str>) -> Result<Vec<Member>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, joined_at, current_partner_id, paired_this_week, last_paired_with_id
             FROM members
             WHERE current_partner_id IS NULL AND id != ?1
             ORDER BY joined_at",
        )?;
        let rows = stmt.query_map(params![exclude.unwrap_or("")], member_from_row)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    // === Pairing commits ===

    /// Commit a pairing for two currently unpaired members.
    ///
    /// Inserts the ledger record and updates both members' pointers in one
    /// transaction. The pointer updates are compare-and-set on
    /// `current_partner_id IS NULL`: if either member was paired
    /// concurrently, the whole transaction rolls back with a
    /// [`StorageError::PointerRace`].
    pub fn commit_pair_guarded(&mut self, record: &PartnershipRecord) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        insert_record(&tx, record)?;
        for (id, partner) in [
            (&record.member1_id, &record.member2_id),
            (&record.member2_id, &record.member1_id),
        ] {
            let updated = tx.execute(
                "UPDATE members
                 SET current_partner_id = ?1, last_paired_with_id = ?1, paired_this_week = 1
                 WHERE id = ?2 AND current_partner_id IS NULL",
                params![partner, id],
            )?;
            if updated != 1 {
                // rolls back on drop
                return Err(StorageError::PointerRace(id.clone()));
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Commit a full reshuffle result in one transaction: insert all new
    /// records, overwrite every paired member's pointers, and null out the
    /// leftover's partner for a solo week.
    ///
    /// A rerun within the same week may reproduce a pair it created before;
    /// that row is reactivated in place rather than rejected.
    pub fn commit_assignments(
        &mut self,
        records: &[PartnershipRecord],
        leftover: Option<&str>,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO partnerships (id, member1_id, member2_id, week_number, year, pair_date, is_active, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(member1_id, member2_id, week_number, year)
                 DO UPDATE SET is_active = 1, pair_date = excluded.pair_date, notes = excluded.notes",
                params![
                    record.id,
                    record.member1_id,
                    record.member2_id,
                    record.week_number,
                    record.year,
                    record.pair_date.to_rfc3339(),
                    record.is_active,
                    record.notes.as_str(),
                ],
            )?;
            for (id, partner) in [
                (&record.member1_id, &record.member2_id),
                (&record.member2_id, &record.member1_id),
            ] {
                tx.execute(
                    "UPDATE members
                     SET current_partner_id = ?1, last_paired_with_id = ?1, paired_this_week = 1
                     WHERE id = ?2",
                    params![partner, id],
                )?;
            }
        }
        if let Some(id) = leftover {
            tx.execute(
                "UPDATE members SET current_partner_id = NULL, paired_this_week = 0 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Dissolve a live pairing: clear both members' pointers and deactivate
    /// any active ledger record involving the pair, in one transaction.
    /// The record itself stays in history for scoring.
    pub fn unpair(&mut self, id1: &str, id2: &str) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        for id in [id1, id2] {
            tx.execute(
                "UPDATE members SET current_partner_id = NULL, paired_this_week = 0 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.execute(
            "UPDATE partnerships SET is_active = 0
             WHERE is_active = 1 AND ((member1_id = ?1 AND member2_id = ?2)
                                   OR (member1_id = ?2 AND member2_id = ?1))",
            params![id1, id2],
        )?;
        tx.commit()?;
        Ok(())
    }

    // === Ledger queries ===

    /// Deactivate every active partnership record, returning the affected
    /// record ids so an aborted run can reactivate them.
    pub fn deactivate_active(&mut self) -> Result<Vec<String>, StorageError> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::new();
        {
            let mut stmt = tx.prepare("SELECT id FROM partnerships WHERE is_active = 1")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
        tx.execute("UPDATE partnerships SET is_active = 0 WHERE is_active = 1", [])?;
        tx.commit()?;
        Ok(ids)
    }

    /// Reactivate the given records (compensation for an aborted run).
    pub fn reactivate(&mut self, ids: &[String]) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        for id in ids {
            tx.execute("UPDATE partnerships SET is_active = 1 WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All partnership records with `pair_date >= cutoff`, active or not.
    pub fn records_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PartnershipRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, member1_id, member2_id, week_number, year, pair_date, is_active, notes
             FROM partnerships WHERE pair_date >= ?1",
        )?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Currently active pairings joined with member names.
    pub fn active_pairs(&self) -> Result<Vec<ActivePair>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.member1_id, m1.name, p.member2_id, m2.name, p.week_number, p.year, p.notes
             FROM partnerships p
             JOIN members m1 ON m1.id = p.member1_id
             JOIN members m2 ON m2.id = p.member2_id
             WHERE p.is_active = 1
             ORDER BY p.pair_date",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ActivePair {
                member1_id: row.get(0)?,
                member1_name: row.get(1)?,
                member2_id: row.get(2)?,
                member2_name: row.get(3)?,
                week_number: row.get(4)?,
                year: row.get(5)?,
                notes: PairingSource::parse(&row.get::<_, String>(6)?),
            })
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    /// Most recent partnership records, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<PartnershipRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, member1_id, member2_id, week_number, year, pair_date, is_active, notes
             FROM partnerships ORDER BY pair_date DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn insert_record(
    tx: &rusqlite::Transaction<'_>,
    record: &PartnershipRecord,
) -> Result<(), StorageError> {
    let result = tx.execute(
        "INSERT INTO partnerships (id, member1_id, member2_id, week_number, year, pair_date, is_active, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.member1_id,
            record.member2_id,
            record.week_number,
            record.year,
            record.pair_date.to_rfc3339(),
            record.is_active,
            record.notes.as_str(),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StorageError::DuplicatePairing {
                member1: record.member1_id.clone(),
                member2: record.member2_id.clone(),
                week: record.week_number,
                year: record.year,
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn member_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        joined_at: parse_datetime(2, &row.get::<_, String>(2)?)?,
        current_partner_id: row.get(3)?,
        paired_this_week: row.get(4)?,
        last_paired_with_id: row.get(5)?,
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PartnershipRecord> {
    Ok(PartnershipRecord {
        id: row.get(0)?,
        member1_id: row.get(1)?,
        member2_id: row.get(2)?,
        week_number: row.get(3)?,
        year: row.get(4)?,
        pair_date: parse_datetime(5, &row.get::<_, String>(5)?)?,
        is_active: row.get(6)?,
        notes: PairingSource::parse(&row.get::<_, String>(7)?),
    })
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
