//! FTS5 full-text search over `messages_meta`, joined through
//! `messages_fts` and `sessions`, with AND-composed filters and BM25 scores
//! normalized to `[0,1]`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::error::SeshdexError;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub session_id: String,
    pub message_id: String,
    pub snippet: String,
    pub score: f64,
    pub timestamp: String,
}

#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub project_filter: Option<String>,
    pub role_filter: Vec<String>,
    pub session_filter: Option<String>,
    pub since_date: Option<String>,
    pub before_date: Option<String>,
    pub limit: Option<i64>,
    pub snippet_tokens: Option<u32>,
}

/// Runs `query` against the FTS5 index. `query` must be non-empty (trimmed)
/// — see [`validate_query`]. Never uses `=` against `messages_fts`; the
/// predicate is always `MATCH`.
pub fn search(conn: &Connection, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
    let query = validate_query(query)?;

    let mut where_clauses = vec!["messages_fts MATCH ?1".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(query)];

    if let Some(p) = &options.project_filter {
        where_clauses.push(format!("LOWER(s.project_name) LIKE LOWER('%' || ?{} || '%')", params_vec.len() + 1));
        params_vec.push(Box::new(p.clone()));
    }
    if !options.role_filter.is_empty() {
        let mut placeholders = Vec::with_capacity(options.role_filter.len());
        for role in &options.role_filter {
            params_vec.push(Box::new(role.clone()));
            placeholders.push(format!("?{}", params_vec.len()));
        }
        where_clauses.push(format!("m.role IN ({})", placeholders.join(", ")));
    }
    if let Some(sess) = &options.session_filter {
        where_clauses.push(format!("m.session_id = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(sess.clone()));
    }
    if let Some(since) = &options.since_date {
        where_clauses.push(format!("m.timestamp >= ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(since.clone()));
    }
    if let Some(before) = &options.before_date {
        where_clauses.push(format!("m.timestamp <= ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(before.clone()));
    }

    let snippet_tokens = options.snippet_tokens.unwrap_or(32);
    let limit = validate_limit(options.limit)?;

    let sql = format!(
        "SELECT m.rowid, m.id, m.session_id, m.timestamp,
                snippet(messages_fts, 0, '<mark>', '</mark>', '...', {snippet_tokens}) as snip,
                bm25(messages_fts) as rank
         FROM messages_fts
         JOIN messages_meta m ON m.rowid = messages_fts.rowid
         JOIN sessions s ON s.id = m.session_id
         WHERE {}
         ORDER BY rank ASC
         LIMIT ?{}",
        where_clauses.join(" AND "),
        params_vec.len() + 1
    );
    params_vec.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, String, String, String, f64)> = stmt
        .query_map(rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())), |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to collect search results")?;

    let raw_scores: Vec<f64> = rows.iter().map(|r| r.4).collect();
    let normalized = normalize_scores(&raw_scores);

    Ok(rows
        .into_iter()
        .zip(normalized)
        .map(|((message_id, session_id, timestamp, snippet, _raw), score)| SearchResult {
            session_id,
            message_id,
            snippet,
            score,
            timestamp,
        })
        .collect())
}

fn validate_query(query: &str) -> Result<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(SeshdexError::UserInput("search query must not be empty".to_string()).into());
    }
    Ok(trimmed.to_string())
}

/// SQLite treats a negative `LIMIT` as unbounded, so a negative limit must
/// be rejected here rather than passed through. `0` is a legal "empty
/// result" request.
fn validate_limit(limit: Option<i64>) -> Result<i64> {
    match limit {
        Some(n) if n < 0 => Err(SeshdexError::UserInput(format!("limit must not be negative, got {n}")).into()),
        Some(n) => Ok(n),
        None => Ok(10),
    }
}

/// Normalizes raw (non-positive, more-negative-is-better) BM25 scores into
/// `[0,1]` where the best match is `1.0`. A single result always normalizes
/// to `1.0`.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.len() == 1 {
        return vec![1.0];
    }
    if raw.is_empty() {
        return Vec::new();
    }
    let best = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let worst = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = worst - best;
    if range <= 0.0 {
        return raw.iter().map(|_| 1.0).collect();
    }
    raw.iter().map(|r| (worst - r) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::storage::{upsert_session, save_messages_batch, MessageInsert, SessionRow};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Connection) {
        let tmp = TempDir::new().unwrap();
        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        upsert_session(&conn, &SessionRow {
            id: "sess1".into(),
            project_path_encoded: "proj".into(),
            project_path_decoded: "/proj".into(),
            project_name: "proj".into(),
            start_time: "2024-01-01T00:00:00Z".into(),
            end_time: None,
            message_count: 0,
            summary: None,
        }).unwrap();
        save_messages_batch(&conn, &[
            MessageInsert { id: "m1".into(), session_id: "sess1".into(), role: "user".into(), content: "alpha beta".into(), timestamp: "2024-01-01T00:00:00Z".into() },
            MessageInsert { id: "m2".into(), session_id: "sess1".into(), role: "assistant".into(), content: "beta gamma".into(), timestamp: "2024-01-02T00:00:00Z".into() },
            MessageInsert { id: "m3".into(), session_id: "sess1".into(), role: "assistant".into(), content: "delta".into(), timestamp: "2024-01-03T00:00:00Z".into() },
        ]).unwrap();
        (tmp, conn)
    }

    #[test]
    fn finds_matching_messages() {
        let (_tmp, conn) = setup();
        let results = search(&conn, "beta", &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.snippet.contains("<mark>beta</mark>") || r.snippet.to_lowercase().contains("beta"));
        }
    }

    #[test]
    fn single_result_normalizes_to_one() {
        let (_tmp, conn) = setup();
        let results = search(&conn, "delta", &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn role_filter_narrows_results() {
        let (_tmp, conn) = setup();
        let opts = SearchOptions { role_filter: vec!["user".to_string()], ..Default::default() };
        let results = search(&conn, "beta", &opts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, "m1");
    }

    #[test]
    fn empty_query_is_user_error() {
        let (_tmp, conn) = setup();
        assert!(search(&conn, "   ", &SearchOptions::default()).is_err());
    }

    #[test]
    fn no_matches_returns_empty_not_error() {
        let (_tmp, conn) = setup();
        let results = search(&conn, "nonexistentword", &SearchOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_limit_returns_empty() {
        let (_tmp, conn) = setup();
        let opts = SearchOptions { limit: Some(0), ..Default::default() };
        let results = search(&conn, "beta", &opts).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn negative_limit_is_user_error() {
        let (_tmp, conn) = setup();
        let opts = SearchOptions { limit: Some(-5), ..Default::default() };
        let err = search(&conn, "beta", &opts).unwrap_err();
        assert!(err.downcast_ref::<crate::error::SeshdexError>().is_some());
    }

    #[test]
    fn normalize_scores_best_is_one() {
        let scores = normalize_scores(&[-10.0, -5.0, -1.0]);
        assert_eq!(scores[0], 1.0);
        assert_eq!(scores[2], 0.0);
    }
}
