// 🗄️ Processing Ledger - Durable register of documents already exported
// SQLite, one row per composite key plus an audit row per merge run

use crate::aggregation::AggregationRecord;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// One completed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRun {
    pub run_id: String,
    pub processed_at: String,
    pub registered: usize,
    pub skipped: usize,
}

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // WAL keeps the register consistent if the process dies mid-run
        conn.pragma_update(None, "journal_mode", "WAL")?;
        setup(&conn)?;
        info!(path = %path.display(), "Opened processing ledger");
        Ok(Ledger { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup(&conn)?;
        Ok(Ledger { conn })
    }

    pub fn is_processed(&self, composite_key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processed_documents WHERE composite_key = ?1",
            params![composite_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn processed_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_documents", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Register a batch and hand the records not seen before to `persist`.
    ///
    /// Registration, `persist` and the run audit row share one transaction:
    /// if `persist` fails nothing is registered and the next run retries.
    /// Keys repeated inside the batch are kept once, first occurrence wins.
    pub fn merge_with<F>(
        &mut self,
        batch: &[AggregationRecord],
        processed_at: DateTime<Utc>,
        persist: F,
    ) -> Result<MergeRun>
    where
        F: FnOnce(&[AggregationRecord]) -> Result<()>,
    {
        let tx = self.conn.transaction()?;
        let run_id = Uuid::new_v4().to_string();
        let stamp = processed_at.to_rfc3339();

        let mut fresh = Vec::new();
        let mut skipped = 0;

        for record in batch {
            let key = record.composite_key();
            let summary = serde_json::to_string(record)?;

            let result = tx.execute(
                "INSERT INTO processed_documents (composite_key, file_name, agent_id, procedure_count, summary, run_id, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key,
                    record.file_name,
                    record.agent_id,
                    record.procedure_count as i64,
                    summary,
                    run_id,
                    stamp,
                ],
            );

            match result {
                Ok(_) => fresh.push(record.clone()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    debug!(key = %key, "Already processed, skipping");
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        persist(&fresh)?;

        tx.execute(
            "INSERT INTO merge_runs (run_id, processed_at, registered, skipped)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, stamp, fresh.len() as i64, skipped as i64],
        )?;
        tx.commit()?;

        info!(run_id = %run_id, registered = fresh.len(), skipped, "Merge run committed");

        Ok(MergeRun {
            run_id,
            processed_at: stamp,
            registered: fresh.len(),
            skipped,
        })
    }

    /// Merge runs, newest first.
    pub fn runs(&self) -> Result<Vec<MergeRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, processed_at, registered, skipped
             FROM merge_runs
             ORDER BY id DESC",
        )?;

        let runs = stmt
            .query_map([], |row| {
                let registered: i64 = row.get(2)?;
                let skipped: i64 = row.get(3)?;
                Ok(MergeRun {
                    run_id: row.get(0)?,
                    processed_at: row.get(1)?,
                    registered: registered as usize,
                    skipped: skipped as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Stored summary for a key, as it was when first registered.
    pub fn summary(&self, composite_key: &str) -> Result<Option<AggregationRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT summary FROM processed_documents WHERE composite_key = ?1")?;
        let mut rows = stmt.query(params![composite_key])?;

        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }
}

fn setup(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS processed_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            composite_key TEXT UNIQUE NOT NULL,
            file_name TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            procedure_count INTEGER NOT NULL,
            summary TEXT NOT NULL,
            run_id TEXT NOT NULL,
            processed_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merge_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            processed_at TEXT NOT NULL,
            registered INTEGER NOT NULL,
            skipped INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_processed_file ON processed_documents(file_name)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
