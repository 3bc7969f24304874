//! External checkpoint file tracking which session ids a sync run has
//! already committed, so an interrupted run can resume without
//! reprocessing them. Save is write-then-rename for near-atomicity; load
//! treats any shape mismatch as "absent" rather than propagating an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub started_at: String,
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub completed_session_ids: Vec<String>,
    pub last_completed_at: String,
}

impl Checkpoint {
    pub fn new(started_at: impl Into<String>, total_sessions: usize) -> Self {
        Checkpoint {
            started_at: started_at.into(),
            total_sessions,
            completed_sessions: 0,
            completed_session_ids: Vec::new(),
            last_completed_at: String::new(),
        }
    }

    pub fn record_completed(&mut self, session_id: impl Into<String>, at: impl Into<String>) {
        self.completed_session_ids.push(session_id.into());
        self.completed_sessions = self.completed_session_ids.len();
        self.last_completed_at = at.into();
    }
}

pub fn default_checkpoint_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seshdex")
        .join("sync_checkpoint.json")
}

/// Atomic-enough save for a personal tool: write to a sibling temp file
/// then rename over the target. Failure is the caller's to log; it is
/// never fatal to the sync it is tracking.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_string_pretty(checkpoint).expect("checkpoint always serializes");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Loads a checkpoint, returning `None` for a missing file, unreadable
/// file, or any JSON shape mismatch. Never propagates an error.
pub fn load(path: &Path) -> Option<Checkpoint> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Checkpoint>(&contents) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!("checkpoint at {} has an invalid shape, ignoring: {e}", path.display());
            None
        }
    }
}

/// Best-effort removal; a missing file is not an error.
pub fn clear(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to clear checkpoint at {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoint.json");
        let mut cp = Checkpoint::new("2024-01-01T00:00:00Z", 5);
        cp.record_completed("sess1", "2024-01-01T00:01:00Z");
        cp.record_completed("sess2", "2024-01-01T00:02:00Z");

        save(&path, &cp).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, cp);
        assert_eq!(loaded.completed_session_ids, vec!["sess1", "sess2"]);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        assert!(load(&path).is_none());
    }

    #[test]
    fn malformed_file_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoint.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn clear_is_best_effort_on_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        clear(&path); // must not panic
    }

    #[test]
    fn clear_removes_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoint.json");
        save(&path, &Checkpoint::new("2024-01-01T00:00:00Z", 1)).unwrap();
        assert!(path.exists());
        clear(&path);
        assert!(!path.exists());
    }
}
