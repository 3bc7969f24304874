//! Usage statistics: total counts plus a per-project breakdown, in the
//! `server/queries/analytics.rs::get_overview` aggregate-query style.

use anyhow::{Context, Result};
use rusqlite::Connection;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProjectBreakdown {
    pub project_name: String,
    pub session_count: i64,
    pub message_count: i64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Stats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_tool_uses: i64,
    pub first_session_start: Option<String>,
    pub last_session_start: Option<String>,
    pub top_projects: Vec<ProjectBreakdown>,
}

pub fn compute_stats(conn: &Connection, top_n: u32) -> Result<Stats> {
    let total_sessions: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
    let total_messages: i64 = conn.query_row("SELECT COUNT(*) FROM messages_meta", [], |r| r.get(0))?;
    let total_tool_uses: i64 = conn.query_row("SELECT COUNT(*) FROM tool_uses", [], |r| r.get(0))?;
    let first_session_start: Option<String> =
        conn.query_row("SELECT MIN(start_time) FROM sessions", [], |r| r.get(0)).unwrap_or(None);
    let last_session_start: Option<String> =
        conn.query_row("SELECT MAX(start_time) FROM sessions", [], |r| r.get(0)).unwrap_or(None);

    let mut stmt = conn.prepare(
        "SELECT project_name, COUNT(*) as session_count, COALESCE(SUM(message_count), 0) as message_count
         FROM sessions
         GROUP BY project_name
         ORDER BY session_count DESC
         LIMIT ?1",
    )?;
    let top_projects = stmt
        .query_map([top_n], |row| {
            Ok(ProjectBreakdown {
                project_name: row.get(0)?,
                session_count: row.get(1)?,
                message_count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to collect project breakdown")?;

    Ok(Stats {
        total_sessions,
        total_messages,
        total_tool_uses,
        first_session_start,
        last_session_start,
        top_projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::storage::{upsert_session, SessionRow};
    use tempfile::TempDir;

    #[test]
    fn aggregates_sessions_and_top_projects() {
        let tmp = TempDir::new().unwrap();
        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        upsert_session(&conn, &SessionRow {
            id: "s1".into(), project_path_encoded: "a".into(), project_path_decoded: "/a".into(),
            project_name: "alpha".into(), start_time: "2024-01-01T00:00:00Z".into(), end_time: None,
            message_count: 3, summary: None,
        }).unwrap();
        upsert_session(&conn, &SessionRow {
            id: "s2".into(), project_path_encoded: "b".into(), project_path_decoded: "/b".into(),
            project_name: "beta".into(), start_time: "2024-02-01T00:00:00Z".into(), end_time: None,
            message_count: 5, summary: None,
        }).unwrap();

        let stats = compute_stats(&conn, 10).unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.top_projects.len(), 2);
    }
}
