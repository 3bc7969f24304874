//! Repository functions over the schema in `schema.sql`: sessions, message
//! metadata (FTS5-backed), tool uses, and extraction state.
//!
//! Duplicate accounting note: `messages_meta` carries three triggers that
//! maintain `messages_fts`. SQLite's reported row-change count after an
//! `INSERT OR IGNORE` includes rows touched by those triggers, so counting
//! `changes() > 0` would overstate how many messages were actually new.
//! Every batch insert into `messages_meta` therefore checks existence by
//! primary key with a separate prepared statement before inserting, the
//! same pattern `content.rs::index_content` and `indexer/db_ops.rs::
//! flush_batch` step 7 use for their own FTS table.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

pub const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionRow {
    pub id: String,
    pub project_path_encoded: String,
    pub project_path_decoded: String,
    pub project_name: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub message_count: i64,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageInsert {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ToolUseInsert {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub input_json: String,
    pub output: Option<String>,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveStats {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<(String, String)>,
}

/// Upsert a session row, used when a session is first seen and again when
/// its final message count / summary / end_time are known.
pub fn upsert_session(conn: &Connection, session: &SessionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, project_path_encoded, project_path_decoded, project_name, start_time, end_time, message_count, summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            project_path_encoded = excluded.project_path_encoded,
            project_path_decoded = excluded.project_path_decoded,
            project_name = excluded.project_name,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            message_count = excluded.message_count,
            summary = excluded.summary",
        params![
            session.id,
            session.project_path_encoded,
            session.project_path_decoded,
            session.project_name,
            session.start_time,
            session.end_time,
            session.message_count,
            session.summary,
        ],
    )
    .context("failed to upsert session")?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
    conn.query_row(
        "SELECT id, project_path_encoded, project_path_decoded, project_name, start_time, end_time, message_count, summary
         FROM sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .optional()
    .context("failed to query session by id")
}

#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub project_filter: Option<String>,
    pub since_date: Option<String>,
    pub before_date: Option<String>,
    pub limit: Option<i64>,
}

/// Composes a dynamic WHERE clause from the non-empty predicates, joined
/// with AND, following the `Vec<Box<dyn ToSql>>` + `params_from_iter`
/// idiom used throughout the query layer.
pub fn find_filtered(conn: &Connection, filter: &SessionFilter) -> Result<Vec<SessionRow>> {
    let mut where_clauses = Vec::new();
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(p) = &filter.project_filter {
        where_clauses.push(format!(
            "LOWER(project_name) LIKE LOWER('%' || ?{} || '%')",
            params_vec.len() + 1
        ));
        params_vec.push(Box::new(p.clone()));
    }
    if let Some(since) = &filter.since_date {
        where_clauses.push(format!("start_time >= ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(since.clone()));
    }
    if let Some(before) = &filter.before_date {
        where_clauses.push(format!("start_time <= ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(before.clone()));
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let limit = filter.limit.unwrap_or(20);
    let sql = format!(
        "SELECT id, project_path_encoded, project_path_decoded, project_name, start_time, end_time, message_count, summary
         FROM sessions {where_sql}
         ORDER BY start_time DESC
         LIMIT ?{}",
        params_vec.len() + 1
    );
    params_vec.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            row_to_session,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to collect filtered sessions")?;
    Ok(rows)
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        project_path_encoded: row.get(1)?,
        project_path_decoded: row.get(2)?,
        project_name: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        message_count: row.get(6)?,
        summary: row.get(7)?,
    })
}

/// Insert a batch of messages inside one immediate-mode transaction,
/// returning exact inserted/skipped counts per the pre-existence-check
/// pattern described above. `inserted + skipped + errors.len() ==
/// messages.len()` always holds.
pub fn save_messages_batch(conn: &Connection, messages: &[MessageInsert]) -> Result<SaveStats> {
    let mut stats = SaveStats::default();
    let tx = conn.unchecked_transaction().context("begin message batch transaction")?;

    {
        let mut check_stmt = tx.prepare_cached("SELECT EXISTS(SELECT 1 FROM messages_meta WHERE id = ?1)")?;
        let mut insert_stmt = tx.prepare_cached(
            "INSERT INTO messages_meta (id, session_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for msg in messages {
            let exists: bool = check_stmt.query_row(params![msg.id], |r| r.get(0))?;
            if exists {
                stats.skipped += 1;
                continue;
            }
            match insert_stmt.execute(params![msg.id, msg.session_id, msg.role, msg.content, msg.timestamp]) {
                Ok(_) => stats.inserted += 1,
                Err(e) => stats.errors.push((msg.id.clone(), e.to_string())),
            }
        }
    }

    tx.commit().context("commit message batch transaction")?;
    Ok(stats)
}

/// Insert a batch of tool uses. `tool_uses` carries no FTS trigger, so a
/// plain `INSERT OR IGNORE` change count is accurate and a pre-check is
/// unnecessary here.
pub fn save_tool_uses_batch(conn: &Connection, tool_uses: &[ToolUseInsert]) -> Result<SaveStats> {
    let mut stats = SaveStats::default();
    let tx = conn.unchecked_transaction().context("begin tool_use batch transaction")?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO tool_uses (id, session_id, name, input_json, output, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for tu in tool_uses {
            match stmt.execute(params![tu.id, tu.session_id, tu.name, tu.input_json, tu.output, tu.status, tu.timestamp]) {
                Ok(changes) if changes > 0 => stats.inserted += 1,
                Ok(_) => stats.skipped += 1,
                Err(e) => stats.errors.push((tu.id.clone(), e.to_string())),
            }
        }
    }

    tx.commit().context("commit tool_use batch transaction")?;
    Ok(stats)
}

/// Records a `tool_result`'s content on the `tool_uses` row it answers, by
/// `tool_use_id`. A result that arrives before its matching tool use (or
/// never finds one) updates zero rows, which is not an error.
pub fn record_tool_result(conn: &Connection, tool_use_id: &str, output: &str, is_error: bool) -> Result<()> {
    let status = if is_error { "error" } else { "complete" };
    conn.execute(
        "UPDATE tool_uses SET output = ?2, status = ?3 WHERE id = ?1",
        params![tool_use_id, output, status],
    )
    .context("failed to record tool result")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl ExtractionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::InProgress => "in_progress",
            ExtractionStatus::Complete => "complete",
            ExtractionStatus::Error => "error",
        }
    }

    fn from_str(s: &str) -> ExtractionStatus {
        match s {
            "in_progress" => ExtractionStatus::InProgress,
            "complete" => ExtractionStatus::Complete,
            "error" => ExtractionStatus::Error,
            _ => ExtractionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionStateRow {
    pub session_path: String,
    pub status: ExtractionStatus,
    pub messages_extracted: i64,
    pub error_message: Option<String>,
    pub file_mtime: Option<i64>,
    pub file_size: Option<i64>,
}

pub fn get_extraction_state(conn: &Connection, session_path: &str) -> Result<Option<ExtractionStateRow>> {
    conn.query_row(
        "SELECT session_path, status, messages_extracted, error_message, file_mtime, file_size
         FROM extraction_state WHERE session_path = ?1",
        params![session_path],
        |row| {
            Ok(ExtractionStateRow {
                session_path: row.get(0)?,
                status: ExtractionStatus::from_str(&row.get::<_, String>(1)?),
                messages_extracted: row.get(2)?,
                error_message: row.get(3)?,
                file_mtime: row.get(4)?,
                file_size: row.get(5)?,
            })
        },
    )
    .optional()
    .context("failed to query extraction state")
}

pub fn mark_in_progress(conn: &Connection, session_path: &str, started_at: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO extraction_state (session_path, started_at, status, messages_extracted)
         VALUES (?1, ?2, 'in_progress', 0)
         ON CONFLICT(session_path) DO UPDATE SET started_at = excluded.started_at, status = 'in_progress'",
        params![session_path, started_at],
    )
    .context("failed to mark extraction in_progress")?;
    Ok(())
}

pub fn mark_complete(
    conn: &Connection,
    session_path: &str,
    completed_at: &str,
    messages_extracted: i64,
    file_mtime: i64,
    file_size: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE extraction_state
         SET status = 'complete', completed_at = ?2, messages_extracted = ?3,
             file_mtime = ?4, file_size = ?5, error_message = NULL
         WHERE session_path = ?1",
        params![session_path, completed_at, messages_extracted, file_mtime, file_size],
    )
    .context("failed to mark extraction complete")?;
    Ok(())
}

pub fn mark_error(conn: &Connection, session_path: &str, error_message: &str) -> Result<()> {
    conn.execute(
        "UPDATE extraction_state SET status = 'error', error_message = ?2 WHERE session_path = ?1",
        params![session_path, error_message],
    )
    .context("failed to mark extraction error")?;
    Ok(())
}
