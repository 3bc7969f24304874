//! Sync orchestrator: discovers session files, decides which need
//! (re-)extraction, and commits each one atomically. Progress is reported
//! through optional callbacks so the CLI can render a live bar while a
//! library caller gets the same information without one.

pub mod jsonl;
pub mod scanner;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use crate::checkpoint::{self, Checkpoint};
use crate::parser::{self, AssistantBlock, ParsedEvent};
use crate::path_codec::ProjectPath;
use crate::shutdown;
use crate::storage::{
    self, ExtractionStatus, MessageInsert, SaveStats, SessionRow, ToolUseInsert,
};
use scanner::SessionFileInfo;

#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    pub force: bool,
    pub project_filter: Option<String>,
    pub session_filter: Option<String>,
    pub quiet: bool,
    pub verbose: bool,
    pub checkpoint_enabled: bool,
    pub checkpoint_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct SyncResult {
    pub success: bool,
    pub sessions_discovered: usize,
    pub sessions_processed: usize,
    pub sessions_skipped: usize,
    pub messages_inserted: usize,
    pub errors: Vec<(String, String)>,
    pub duration_ms: u64,
    pub aborted: bool,
    pub recovered_from_checkpoint: Option<usize>,
}

/// Callbacks a caller can supply to observe progress. Kept as a struct of
/// trait objects (rather than generic closures) so `SyncOptions` stays
/// `Clone` and the CLI can build one without infecting the whole module
/// with a type parameter.
#[derive(Default)]
pub struct SyncCallbacks<'a> {
    pub on_progress: Option<Box<dyn FnMut(usize, usize) + 'a>>,
    pub on_session_complete: Option<Box<dyn FnMut(&str, &Result<usize, String>) + 'a>>,
}

struct ExtractedSession {
    session_row: SessionRow,
    messages: Vec<MessageInsert>,
    tool_uses: Vec<ToolUseInsert>,
    tool_results: Vec<(String, String, bool)>,
}

/// Run a full sync against `sessions_root`, committing into `conn`.
pub fn run_sync(
    conn: &Connection,
    sessions_root: &Path,
    options: &SyncOptions,
    callbacks: &mut SyncCallbacks,
) -> Result<SyncResult> {
    let start = Instant::now();
    let mut result = SyncResult::default();

    let mut discovered = scanner::discover(sessions_root)
        .with_context(|| format!("failed to scan sessions root {}", sessions_root.display()))?;

    if let Some(project_filter) = &options.project_filter {
        let needle = project_filter.to_lowercase();
        discovered.retain(|s| s.project_path.decoded().to_lowercase().contains(&needle));
    }
    if let Some(session_filter) = &options.session_filter {
        discovered.retain(|s| &s.id == session_filter);
    }

    result.sessions_discovered = discovered.len();

    let checkpoint_path = options
        .checkpoint_path
        .clone()
        .unwrap_or_else(checkpoint::default_checkpoint_path);

    let mut skip_set: HashSet<String> = HashSet::new();
    if options.checkpoint_enabled {
        if let Some(cp) = checkpoint::load(&checkpoint_path) {
            skip_set = cp.completed_session_ids.iter().cloned().collect();
            result.recovered_from_checkpoint = Some(skip_set.len());
            tracing::info!("resuming sync: {} sessions already checkpointed", skip_set.len());
        }
    }

    let mut running_checkpoint = Checkpoint::new(now_iso(), discovered.len());
    running_checkpoint.completed_session_ids = skip_set.iter().cloned().collect();
    running_checkpoint.completed_sessions = running_checkpoint.completed_session_ids.len();

    let total = discovered.len();
    for (index, session_file) in discovered.iter().enumerate() {
        if shutdown::should_abort() {
            result.aborted = true;
            break;
        }
        if skip_set.contains(&session_file.id) {
            continue;
        }

        let session_path_str = session_file.path.to_string_lossy().to_string();

        if !options.force && !needs_extraction(conn, session_file, &session_path_str)? {
            result.sessions_skipped += 1;
            if let Some(cb) = callbacks.on_progress.as_mut() {
                cb(index + 1, total);
            }
            continue;
        }

        let outcome = extract_and_commit(conn, session_file, &session_path_str);
        match outcome {
            Ok(inserted) => {
                result.sessions_processed += 1;
                result.messages_inserted += inserted;
                if let Some(cb) = callbacks.on_session_complete.as_mut() {
                    cb(&session_file.id, &Ok(inserted));
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                let _ = storage::mark_error(conn, &session_path_str, &message);
                result.errors.push((session_file.id.clone(), message.clone()));
                if let Some(cb) = callbacks.on_session_complete.as_mut() {
                    cb(&session_file.id, &Err(message));
                }
            }
        }

        if options.checkpoint_enabled {
            running_checkpoint.record_completed(session_file.id.clone(), now_iso());
            if let Err(e) = checkpoint::save(&checkpoint_path, &running_checkpoint) {
                tracing::warn!("failed to persist checkpoint: {e}");
            }
        }

        if let Some(cb) = callbacks.on_progress.as_mut() {
            cb(index + 1, total);
        }
    }

    if !result.aborted && options.checkpoint_enabled {
        checkpoint::clear(&checkpoint_path);
    }

    result.success = result.errors.is_empty() && !result.aborted;
    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn needs_extraction(conn: &Connection, session_file: &SessionFileInfo, session_path: &str) -> Result<bool> {
    let state = storage::get_extraction_state(conn, session_path)?;
    let Some(state) = state else {
        return Ok(true);
    };
    if state.status != ExtractionStatus::Complete {
        return Ok(true);
    }
    let (Some(stored_mtime), Some(stored_size)) = (state.file_mtime, state.file_size) else {
        return Ok(true);
    };
    let current_mtime = session_file.modified_time_ms as i64;
    let current_size = session_file.size_bytes as i64;
    Ok(stored_mtime != current_mtime || stored_size != current_size)
}

/// Parses a session file in full, then commits everything it produced in
/// one immediate-mode transaction. A failure partway through extraction or
/// commit leaves no partial data: the session remains eligible for retry on
/// the next sync.
fn extract_and_commit(conn: &Connection, session_file: &SessionFileInfo, session_path: &str) -> Result<usize> {
    storage::mark_in_progress(conn, session_path, &now_iso())?;

    let extracted = extract_session(session_file)
        .with_context(|| format!("failed to extract {}", session_file.path.display()))?;

    let tx = conn.unchecked_transaction().context("begin session commit transaction")?;

    storage::upsert_session(&tx, &extracted.session_row)?;

    let mut save_stats = SaveStats::default();
    for chunk in extracted.messages.chunks(storage::BATCH_SIZE) {
        let chunk_stats = storage::save_messages_batch(&tx, chunk)?;
        save_stats.inserted += chunk_stats.inserted;
        save_stats.skipped += chunk_stats.skipped;
        save_stats.errors.extend(chunk_stats.errors);
    }
    for chunk in extracted.tool_uses.chunks(storage::BATCH_SIZE) {
        storage::save_tool_uses_batch(&tx, chunk)?;
    }
    for (tool_use_id, output, is_error) in &extracted.tool_results {
        storage::record_tool_result(&tx, tool_use_id, output, *is_error)?;
    }

    storage::mark_complete(
        &tx,
        session_path,
        &now_iso(),
        extracted.messages.len() as i64,
        session_file.modified_time_ms as i64,
        session_file.size_bytes as i64,
    )?;

    tx.commit().context("commit session transaction")?;

    Ok(save_stats.inserted)
}

/// Streams `session_file`'s JSONL content through the event parser,
/// accumulating everything the storage layer needs to commit the session in
/// one shot. One session is held in memory at a time; session files are
/// small enough in practice that this never competes with the batching done
/// at commit time.
fn extract_session(session_file: &SessionFileInfo) -> Result<ExtractedSession> {
    let mut reader = jsonl::JsonlReader::open(&session_file.path, 0)?;

    let project_path: &ProjectPath = &session_file.project_path;
    let mut messages = Vec::new();
    let mut tool_uses = Vec::new();
    let mut tool_results = Vec::new();
    let mut summary: Option<String> = None;
    let mut first_timestamp: Option<String> = None;
    let mut last_timestamp: Option<String> = None;
    let mut line_number = 0u64;

    while let Some((line, _offset)) = reader.next_line()? {
        line_number += 1;
        for event in parser::parse_line(&line, line_number) {
            note_timestamp(&mut first_timestamp, &mut last_timestamp, event_timestamp(&event));

            match event {
                ParsedEvent::User { uuid, content, timestamp, .. } => {
                    messages.push(MessageInsert {
                        id: uuid,
                        session_id: session_file.id.clone(),
                        role: "user".to_string(),
                        content,
                        timestamp,
                    });
                }
                ParsedEvent::Assistant { uuid, content_blocks, timestamp, .. } => {
                    let text = content_blocks
                        .into_iter()
                        .filter_map(|b| match b {
                            AssistantBlock::Text(t) => Some(t),
                            AssistantBlock::ToolUse { .. } => None,
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !text.is_empty() {
                        messages.push(MessageInsert {
                            id: uuid,
                            session_id: session_file.id.clone(),
                            role: "assistant".to_string(),
                            content: text,
                            timestamp,
                        });
                    }
                }
                ParsedEvent::ToolUse { uuid, name, input, timestamp } => {
                    tool_uses.push(ToolUseInsert {
                        id: uuid,
                        session_id: session_file.id.clone(),
                        name,
                        input_json: input.to_string(),
                        output: None,
                        status: "pending".to_string(),
                        timestamp,
                    });
                }
                ParsedEvent::ToolResult { tool_use_id, content, is_error, .. } => {
                    tool_results.push((tool_use_id, content, is_error));
                }
                ParsedEvent::Summary { content, .. } => {
                    summary = Some(content);
                }
                ParsedEvent::System { .. } | ParsedEvent::Skipped { .. } => {}
            }
        }
    }

    let session_row = SessionRow {
        id: session_file.id.clone(),
        project_path_encoded: project_path.encoded().to_string(),
        project_path_decoded: project_path.decoded().to_string(),
        project_name: project_path.project_name().to_string(),
        start_time: first_timestamp.unwrap_or_default(),
        end_time: last_timestamp,
        message_count: messages.len() as i64,
        summary,
    };

    Ok(ExtractedSession {
        session_row,
        messages,
        tool_uses,
        tool_results,
    })
}

fn event_timestamp(event: &ParsedEvent) -> Option<&str> {
    match event {
        ParsedEvent::User { timestamp, .. }
        | ParsedEvent::Assistant { timestamp, .. }
        | ParsedEvent::ToolUse { timestamp, .. }
        | ParsedEvent::ToolResult { timestamp, .. }
        | ParsedEvent::Summary { timestamp, .. }
        | ParsedEvent::System { timestamp, .. } => Some(timestamp.as_str()),
        ParsedEvent::Skipped { .. } => None,
    }
}

fn note_timestamp(first: &mut Option<String>, last: &mut Option<String>, ts: Option<&str>) {
    let Some(ts) = ts else { return };
    if ts.is_empty() {
        return;
    }
    if first.is_none() {
        *first = Some(ts.to_string());
    }
    *last = Some(ts.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::fs;
    use tempfile::TempDir;

    fn write_session(root: &Path, project: &str, session_id: &str, lines: &[&str]) {
        let dir = root.join(project);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{session_id}.jsonl")), lines.join("\n")).unwrap();
    }

    #[test]
    fn fresh_sync_discovers_and_commits_sessions() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        write_session(
            &root,
            "proj-one",
            "sess-a",
            &[r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hello"}}"#],
        );

        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        let mut callbacks = SyncCallbacks::default();
        let result = run_sync(&conn, &root, &SyncOptions::default(), &mut callbacks).unwrap();

        assert_eq!(result.sessions_discovered, 1);
        assert_eq!(result.sessions_processed, 1);
        assert!(result.success);

        let session = storage::find_by_id(&conn, "sess-a").unwrap().unwrap();
        assert_eq!(session.message_count, 1);
    }

    #[test]
    fn unchanged_session_is_skipped_on_second_sync() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        write_session(
            &root,
            "proj-one",
            "sess-a",
            &[r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hello"}}"#],
        );

        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        let mut callbacks = SyncCallbacks::default();
        run_sync(&conn, &root, &SyncOptions::default(), &mut callbacks).unwrap();

        let mut callbacks2 = SyncCallbacks::default();
        let second = run_sync(&conn, &root, &SyncOptions::default(), &mut callbacks2).unwrap();
        assert_eq!(second.sessions_processed, 0);
        assert_eq!(second.sessions_skipped, 1);
    }

    #[test]
    fn force_reprocesses_unchanged_session() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        write_session(
            &root,
            "proj-one",
            "sess-a",
            &[r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hello"}}"#],
        );

        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        let mut callbacks = SyncCallbacks::default();
        run_sync(&conn, &root, &SyncOptions::default(), &mut callbacks).unwrap();

        let opts = SyncOptions { force: true, ..Default::default() };
        let mut callbacks2 = SyncCallbacks::default();
        let second = run_sync(&conn, &root, &opts, &mut callbacks2).unwrap();
        assert_eq!(second.sessions_processed, 1);
    }

    #[test]
    fn project_filter_narrows_discovery() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        write_session(&root, "alice-proj-one", "sess-a", &[r#"{"type":"summary","summary":"x"}"#]);
        write_session(&root, "bob-proj-two", "sess-b", &[r#"{"type":"summary","summary":"y"}"#]);

        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        let opts = SyncOptions { project_filter: Some("alice".to_string()), ..Default::default() };
        let mut callbacks = SyncCallbacks::default();
        let result = run_sync(&conn, &root, &opts, &mut callbacks).unwrap();
        assert_eq!(result.sessions_discovered, 1);
    }

    #[test]
    fn checkpoint_resumes_after_abort() {
        shutdown::reset_for_test();
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        for i in 0..3 {
            write_session(
                &root,
                "proj-one",
                &format!("sess-{i}"),
                &[&format!(
                    r#"{{"type":"user","uuid":"u{i}","timestamp":"2024-01-01T00:00:00Z","message":{{"role":"user","content":"hello {i}"}}}}"#
                )],
            );
        }

        let conn = db::open(&tmp.path().join("test.db")).unwrap();
        let checkpoint_path = tmp.path().join("checkpoint.json");

        let mut completed = 0;
        let opts = SyncOptions { checkpoint_enabled: true, checkpoint_path: Some(checkpoint_path.clone()), ..Default::default() };
        {
            let mut callbacks = SyncCallbacks {
                on_session_complete: Some(Box::new(|_id, _outcome| {
                    completed += 1;
                    if completed == 2 {
                        shutdown::force_abort_for_test();
                    }
                })),
                ..Default::default()
            };
            let result = run_sync(&conn, &root, &opts, &mut callbacks).unwrap();
            assert!(result.aborted);
            assert_eq!(result.sessions_processed, 2);
        }

        shutdown::reset_for_test();
        let mut callbacks2 = SyncCallbacks::default();
        let second = run_sync(&conn, &root, &opts, &mut callbacks2).unwrap();
        assert_eq!(second.recovered_from_checkpoint, Some(2));
        assert_eq!(second.sessions_processed, 1);
        assert!(!checkpoint_path.exists());
    }
}
