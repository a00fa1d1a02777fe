//! SQLite turn journal.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods — it never executes SQL directly.

use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    error::SimResult,
    event::EventLogEntry,
    types::{Health, Turn, SLOT_COUNT},
};

pub struct SimStore {
    conn: Connection,
}

/// One row per completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRow {
    pub run_id: String,
    pub turn: Turn,
    pub player: String,
    pub subject_idx: i32,
    pub score: i32,
    pub fluoride: i32,
    pub tool_dip: i32,
    pub tool_effort: i32,
    pub mood: String,
    pub patience: i32,
    pub fangs: [Health; SLOT_COUNT],
    pub annotation: String,
}

impl SimStore {
    /// Open (or create) the journal database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; ignore the answer.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_journal.sql"))?;
        Ok(())
    }

    /// Run `work` inside one transaction; any error rolls all of it back.
    pub fn in_transaction<T>(&self, work: impl FnOnce(&Self) -> SimResult<T>) -> SimResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = work(self)?;
        tx.commit()?;
        Ok(value)
    }

        // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: Option<u64>, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                seed.map(|s| s as i64),
                version,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> SimResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM run", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, turn, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.turn,
                entry.event_type,
                entry.payload,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, turn, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    turn: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Turn log ───────────────────────────────────────────────

    pub fn record_turn(&self, row: &TurnRow) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO turn_log (
                run_id, turn, player, subject_idx, score, fluoride, tool_dip, tool_effort,
                mood, patience, fang1, fang2, fang3, fang4, annotation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                row.run_id,
                row.turn,
                row.player,
                row.subject_idx,
                row.score,
                row.fluoride,
                row.tool_dip,
                row.tool_effort,
                row.mood,
                row.patience,
                row.fangs[0],
                row.fangs[1],
                row.fangs[2],
                row.fangs[3],
                row.annotation,
            ],
        )?;
        Ok(())
    }

    pub fn turn_rows(&self, run_id: &str) -> SimResult<Vec<TurnRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, turn, player, subject_idx, score, fluoride, tool_dip, tool_effort,
                    mood, patience, fang1, fang2, fang3, fang4, annotation
             FROM turn_log WHERE run_id = ?1
             ORDER BY turn ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(TurnRow {
                    run_id: row.get(0)?,
                    turn: row.get(1)?,
                    player: row.get(2)?,
                    subject_idx: row.get(3)?,
                    score: row.get(4)?,
                    fluoride: row.get(5)?,
                    tool_dip: row.get(6)?,
                    tool_effort: row.get(7)?,
                    mood: row.get(8)?,
                    patience: row.get(9)?,
                    fangs: [row.get(10)?, row.get(11)?, row.get(12)?, row.get(13)?],
                    annotation: row.get(14)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, run_id: &str, turn: Turn, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO snapshot (run_id, turn, state_json) VALUES (?1, ?2, ?3)",
            params![run_id, turn, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot(&self, run_id: &str) -> SimResult<Option<(Turn, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT turn, state_json FROM snapshot
                 WHERE run_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![run_id],
                |row| Ok((row.get::<_, Turn>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(result)
    }
}
