use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::extract::SeenState;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub regulations_table: String,
    pub component_table: String,
    /// Component every new regulation gets linked to.
    pub component_id: i64,
    /// Entity stamped on rows that do not name one.
    pub entity: String,
}

/// One connection, opened per pipeline step and closed on drop.
pub struct Store {
    conn: Connection,
    config: StoreConfig,
}

pub struct RegulationRow {
    pub title: String,
    pub created_at: String,
    pub update_at: Option<String>,
    pub is_active: bool,
    pub gtype: Option<String>,
    pub entity: Option<String>,
    pub external_link: Option<String>,
    pub rtype_id: Option<i64>,
    pub summary: Option<String>,
    pub classification_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub inserted_count: usize,
    pub duplicate_count: usize,
    pub components_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub regulations: usize,
    pub components: usize,
}

impl Store {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StoreError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&config.db_path).map_err(|source| StoreError::Connect {
            path: config.db_path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, config)
    }

    #[cfg(test)]
    pub fn open_in_memory(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &StoreConfig) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Store {
            conn,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        let reg = &self.config.regulations_table;
        let comp = &self.config.component_table;
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {reg} (
                id                INTEGER PRIMARY KEY,
                title             TEXT NOT NULL,
                created_at        TEXT NOT NULL,
                update_at         TEXT,
                is_active         BOOLEAN NOT NULL DEFAULT 1,
                gtype             TEXT,
                entity            TEXT,
                external_link     TEXT,
                rtype_id          INTEGER,
                summary           TEXT,
                classification_id INTEGER
            );
            -- natural key: a missing link and an empty one are the same regulation
            CREATE UNIQUE INDEX IF NOT EXISTS idx_{reg}_natural_key
                ON {reg}(title, created_at, COALESCE(external_link, ''));
            CREATE INDEX IF NOT EXISTS idx_{reg}_entity ON {reg}(entity, created_at);

            CREATE TABLE IF NOT EXISTS {comp} (
                id             INTEGER PRIMARY KEY,
                regulations_id INTEGER NOT NULL REFERENCES {reg}(id) ON DELETE CASCADE,
                components_id  INTEGER NOT NULL,
                UNIQUE(regulations_id, components_id)
            );
            CREATE INDEX IF NOT EXISTS idx_{comp}_regulation ON {comp}(regulations_id);
            "
        ))?;
        Ok(())
    }

    /// Insert rows that are not already stored and link each new one to the
    /// configured component. Natural-key conflicts are counted, not raised.
    pub fn insert_regulations(&self, rows: &[RegulationRow]) -> Result<WriteReport, StoreError> {
        let reg = &self.config.regulations_table;
        let comp = &self.config.component_table;
        let mut report = WriteReport::default();
        let mut new_ids = Vec::new();

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {reg}
                 (title, created_at, update_at, is_active, gtype, entity,
                  external_link, rtype_id, summary, classification_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for r in rows {
                let changed = insert.execute(params![
                    r.title, r.created_at, r.update_at, r.is_active, r.gtype, r.entity,
                    r.external_link, r.rtype_id, r.summary, r.classification_id,
                ])?;
                if changed == 0 {
                    debug!(title = %r.title, created_at = %r.created_at, "Duplicate regulation skipped");
                    report.duplicate_count += 1;
                } else {
                    new_ids.push(tx.last_insert_rowid());
                }
            }
            report.inserted_count = new_ids.len();

            let mut link = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {comp} (regulations_id, components_id) VALUES (?1, ?2)"
            ))?;
            for id in &new_ids {
                report.components_written += link.execute(params![id, self.config.component_id])?;
            }
        }
        tx.commit()?;

        info!(
            inserted = report.inserted_count,
            duplicates = report.duplicate_count,
            components = report.components_written,
            "Regulations written"
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let count = |table: &str| -> Result<usize, StoreError> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        };
        Ok(StoreStats {
            regulations: count(&self.config.regulations_table)?,
            components: count(&self.config.component_table)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl SeenState for Store {
    fn latest_created_at(&self, entity: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        let latest: Option<String> = self.conn.query_row(
            &format!(
                "SELECT MAX(created_at) FROM {} WHERE entity = ?1",
                self.config.regulations_table
            ),
            params![entity],
            |r| r.get(0),
        )?;
        Ok(latest.as_deref().and_then(parse_created_at))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or anything starting with a `YYYY-MM-DD` token.
pub fn parse_created_at(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            let first = text.split_whitespace().next()?;
            NaiveDate::parse_from_str(first, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })
}
