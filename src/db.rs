//! SQLite-backed store for editor metrics and Bundle authorizations.
//!
//! The database lives at `~/.editorsync/editors.db`. Each editor row is the
//! cached image of one account's activity metrics; the batch updater reads a
//! row, recomputes the eligibility columns in memory, and writes the whole
//! row back in a single statement. Timestamps are RFC 3339 TEXT in UTC with
//! fixed-width fractional seconds, so SQL string comparison orders them
//! chronologically.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),
}

/// A row from the `editors` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorRecord {
    pub wp_username: String,
    /// Global user id; checked against the fetched snapshot's id.
    pub wp_sub: i64,
    pub wp_editcount: i64,
    pub wp_editcount_updated: DateTime<Utc>,
    /// Rolling-window baseline count.
    pub wp_editcount_prev: i64,
    /// Start of the rolling window; `None` before the first evaluation.
    pub wp_editcount_prev_updated: Option<DateTime<Utc>>,
    pub wp_editcount_recent: i64,
    pub wp_enough_recent_edits: bool,
    pub wp_enough_edits: bool,
    pub wp_not_blocked: bool,
    /// Fixed external input; recomputed elsewhere, never by this tool.
    pub wp_account_old_enough: bool,
    /// Staff override: blocks are ignored in validity.
    pub ignore_wp_blocks: bool,
    pub wp_valid: bool,
    /// Manual revocation; always makes the editor ineligible.
    pub bundle_access_revoked: bool,
    pub wp_bundle_eligible: bool,
}

impl EditorRecord {
    /// A fresh record with no activity history. `updated` doubles as the
    /// creation reference that anchors the first rolling window.
    pub fn new(wp_username: &str, wp_sub: i64, updated: DateTime<Utc>) -> Self {
        Self {
            wp_username: wp_username.to_string(),
            wp_sub,
            wp_editcount: 0,
            wp_editcount_updated: updated,
            wp_editcount_prev: 0,
            wp_editcount_prev_updated: None,
            wp_editcount_recent: 0,
            wp_enough_recent_edits: false,
            wp_enough_edits: false,
            wp_not_blocked: false,
            wp_account_old_enough: false,
            ignore_wp_blocks: false,
            wp_valid: false,
            bundle_access_revoked: false,
            wp_bundle_eligible: false,
        }
    }
}

/// A row from the `authorizations` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbAuthorization {
    pub id: i64,
    pub wp_username: String,
    pub date_authorized: DateTime<Utc>,
    /// `None` while the authorization is open.
    pub date_expired: Option<DateTime<Utc>>,
}

/// Format a timestamp for storage. Fixed-width microseconds keep string
/// ordering equal to chronological ordering.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored timestamp inside a row mapper.
fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

const EDITOR_COLUMNS: &str = "wp_username, wp_sub, wp_editcount, wp_editcount_updated,
     wp_editcount_prev, wp_editcount_prev_updated, wp_editcount_recent,
     wp_enough_recent_edits, wp_enough_edits, wp_not_blocked,
     wp_account_old_enough, ignore_wp_blocks, wp_valid,
     bundle_access_revoked, wp_bundle_eligible";

fn map_editor(row: &rusqlite::Row<'_>) -> rusqlite::Result<EditorRecord> {
    let updated: String = row.get(3)?;
    let prev_updated: Option<String> = row.get(5)?;
    Ok(EditorRecord {
        wp_username: row.get(0)?,
        wp_sub: row.get(1)?,
        wp_editcount: row.get(2)?,
        wp_editcount_updated: parse_ts(3, updated)?,
        wp_editcount_prev: row.get(4)?,
        wp_editcount_prev_updated: prev_updated.map(|s| parse_ts(5, s)).transpose()?,
        wp_editcount_recent: row.get(6)?,
        wp_enough_recent_edits: row.get(7)?,
        wp_enough_edits: row.get(8)?,
        wp_not_blocked: row.get(9)?,
        wp_account_old_enough: row.get(10)?,
        ignore_wp_blocks: row.get(11)?,
        wp_valid: row.get(12)?,
        bundle_access_revoked: row.get(13)?,
        wp_bundle_eligible: row.get(14)?,
    })
}

/// SQLite connection wrapper for editor metrics and authorizations.
///
/// Intentionally not `Clone` or `Sync`: the batch pass is single-threaded
/// and processes records strictly one at a time.
pub struct EditorDb {
    conn: Connection,
}

impl EditorDb {
    /// Open (or create) the database at `~/.editorsync/editors.db` and apply
    /// the schema.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        // All statements use IF NOT EXISTS, so this is idempotent.
        conn.execute_batch(include_str!("schema.sql"))?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.editorsync/editors.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".editorsync").join("editors.db"))
    }

    // =========================================================================
    // Editors
    // =========================================================================

    /// Query editors whose metrics were last updated strictly before `cutoff`,
    /// optionally narrowed to one username. The filter is ANDed into the same
    /// WHERE clause, so it can only narrow the stale set, never widen it.
    pub fn get_stale_editors(
        &self,
        cutoff: DateTime<Utc>,
        wp_username: Option<&str>,
    ) -> Result<Vec<EditorRecord>, DbError> {
        let cutoff = fmt_ts(cutoff);
        let mut editors = Vec::new();

        match wp_username {
            Some(username) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {EDITOR_COLUMNS} FROM editors
                     WHERE wp_editcount_updated < ?1 AND wp_username = ?2
                     ORDER BY wp_username"
                ))?;
                let rows = stmt.query_map(params![cutoff, username], map_editor)?;
                for row in rows {
                    editors.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {EDITOR_COLUMNS} FROM editors
                     WHERE wp_editcount_updated < ?1
                     ORDER BY wp_username"
                ))?;
                let rows = stmt.query_map(params![cutoff], map_editor)?;
                for row in rows {
                    editors.push(row?);
                }
            }
        }

        Ok(editors)
    }

    /// Get a single editor by username.
    pub fn get_editor(&self, wp_username: &str) -> Result<Option<EditorRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EDITOR_COLUMNS} FROM editors WHERE wp_username = ?1"
        ))?;

        let mut rows = stmt.query_map(params![wp_username], map_editor)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or fully replace an editor row. The whole multi-field update is
    /// computed in memory first, so one call persists one record atomically.
    pub fn save_editor(&self, editor: &EditorRecord) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO editors (
                wp_username, wp_sub, wp_editcount, wp_editcount_updated,
                wp_editcount_prev, wp_editcount_prev_updated, wp_editcount_recent,
                wp_enough_recent_edits, wp_enough_edits, wp_not_blocked,
                wp_account_old_enough, ignore_wp_blocks, wp_valid,
                bundle_access_revoked, wp_bundle_eligible
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(wp_username) DO UPDATE SET
                wp_sub = excluded.wp_sub,
                wp_editcount = excluded.wp_editcount,
                wp_editcount_updated = excluded.wp_editcount_updated,
                wp_editcount_prev = excluded.wp_editcount_prev,
                wp_editcount_prev_updated = excluded.wp_editcount_prev_updated,
                wp_editcount_recent = excluded.wp_editcount_recent,
                wp_enough_recent_edits = excluded.wp_enough_recent_edits,
                wp_enough_edits = excluded.wp_enough_edits,
                wp_not_blocked = excluded.wp_not_blocked,
                wp_account_old_enough = excluded.wp_account_old_enough,
                ignore_wp_blocks = excluded.ignore_wp_blocks,
                wp_valid = excluded.wp_valid,
                bundle_access_revoked = excluded.bundle_access_revoked,
                wp_bundle_eligible = excluded.wp_bundle_eligible",
            params![
                editor.wp_username,
                editor.wp_sub,
                editor.wp_editcount,
                fmt_ts(editor.wp_editcount_updated),
                editor.wp_editcount_prev,
                editor.wp_editcount_prev_updated.map(fmt_ts),
                editor.wp_editcount_recent,
                editor.wp_enough_recent_edits,
                editor.wp_enough_edits,
                editor.wp_not_blocked,
                editor.wp_account_old_enough,
                editor.ignore_wp_blocks,
                editor.wp_valid,
                editor.bundle_access_revoked,
                editor.wp_bundle_eligible,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Authorizations
    // =========================================================================

    /// Bring the editor's Bundle authorization in line with the eligibility
    /// flag just computed.
    ///
    /// Eligible with no open authorization: revive the most recent lapsed one
    /// if any, otherwise insert a new row stamped `reference_time`. Not
    /// eligible: stamp any open row's `date_expired`. Already consistent
    /// states are left untouched, which keeps repeated passes idempotent.
    pub fn update_bundle_authorization(
        &self,
        editor: &EditorRecord,
        reference_time: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if editor.wp_bundle_eligible {
            let open: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM authorizations
                 WHERE wp_username = ?1 AND date_expired IS NULL",
                params![editor.wp_username],
                |row| row.get(0),
            )?;
            if open > 0 {
                return Ok(());
            }

            let revived = self.conn.execute(
                "UPDATE authorizations SET date_expired = NULL
                 WHERE id = (
                     SELECT id FROM authorizations
                     WHERE wp_username = ?1 AND date_expired IS NOT NULL
                     ORDER BY date_authorized DESC LIMIT 1
                 )",
                params![editor.wp_username],
            )?;
            if revived == 0 {
                self.conn.execute(
                    "INSERT INTO authorizations (wp_username, date_authorized, date_expired)
                     VALUES (?1, ?2, NULL)",
                    params![editor.wp_username, fmt_ts(reference_time)],
                )?;
            }
        } else {
            self.conn.execute(
                "UPDATE authorizations SET date_expired = ?2
                 WHERE wp_username = ?1 AND date_expired IS NULL",
                params![editor.wp_username, fmt_ts(reference_time)],
            )?;
        }
        Ok(())
    }

    /// All authorization rows for an editor, oldest first.
    pub fn get_authorizations(
        &self,
        wp_username: &str,
    ) -> Result<Vec<DbAuthorization>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, wp_username, date_authorized, date_expired
             FROM authorizations WHERE wp_username = ?1
             ORDER BY date_authorized",
        )?;

        let rows = stmt.query_map(params![wp_username], |row| {
            let authorized: String = row.get(2)?;
            let expired: Option<String> = row.get(3)?;
            Ok(DbAuthorization {
                id: row.get(0)?,
                wp_username: row.get(1)?,
                date_authorized: parse_ts(2, authorized)?,
                date_expired: expired.map(|s| parse_ts(3, s)).transpose()?,
            })
        })?;

        let mut authorizations = Vec::new();
        for row in rows {
            authorizations.push(row?);
        }
        Ok(authorizations)
    }
}
