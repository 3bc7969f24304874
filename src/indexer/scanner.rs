//! Discovers session files under the sessions root. The root contains one
//! encoded-project directory per immediate child; each `.jsonl` file
//! directly inside a project directory is a session. A session may also own
//! nested subagent sessions under `<session_id>/subagents/*.jsonl`.

use crate::path_codec::ProjectPath;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A discovered session file and the metadata needed to decide whether it
/// has already been extracted.
#[derive(Debug, Clone)]
pub struct SessionFileInfo {
    pub id: String,
    pub path: PathBuf,
    pub project_path: ProjectPath,
    pub modified_time_ms: u64,
    pub size_bytes: u64,
}

/// Recursively discover every session file under `root`. Directory read
/// errors on a single node are logged and that node is skipped; discovery
/// continues with its siblings.
pub fn discover(root: &Path) -> Result<Vec<SessionFileInfo>> {
    let mut sessions = Vec::new();
    let project_dirs = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("sessions root does not exist: {}", root.display());
            return Ok(sessions);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read sessions root {}", root.display()));
        }
    };

    for project_entry in project_dirs {
        let project_entry = match project_entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("failed to read entry under {}: {e}", root.display());
                continue;
            }
        };
        let project_dir = project_entry.path();
        if !project_dir.is_dir() {
            continue;
        }
        let Some(encoded) = project_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(project_path) = ProjectPath::from_encoded(encoded) else {
            continue;
        };

        if let Err(e) = scan_project_dir(&project_dir, &project_path, &mut sessions) {
            tracing::warn!("failed to scan project directory {}: {e}", project_dir.display());
        }
    }

    sessions.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(sessions)
}

fn scan_project_dir(
    project_dir: &Path,
    project_path: &ProjectPath,
    out: &mut Vec<SessionFileInfo>,
) -> Result<()> {
    let entries = match fs::read_dir(project_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!("permission denied: {}", project_dir.display());
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", project_dir.display())),
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", project_dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("file type for {}", path.display()))?;

        if file_type.is_file() {
            if let Some(info) = session_file_info(&path, project_path)? {
                out.push(info);
            }
        } else if file_type.is_dir() {
            let subagents_dir = path.join("subagents");
            if subagents_dir.is_dir() {
                scan_subagents_dir(&subagents_dir, project_path, out)?;
            }
        }
    }
    Ok(())
}

fn scan_subagents_dir(
    subagents_dir: &Path,
    project_path: &ProjectPath,
    out: &mut Vec<SessionFileInfo>,
) -> Result<()> {
    let entries = match fs::read_dir(subagents_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!("permission denied: {}", subagents_dir.display());
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", subagents_dir.display())),
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", subagents_dir.display()))?;
        let path = entry.path();
        if path.is_file() {
            if let Some(info) = session_file_info(&path, project_path)? {
                out.push(info);
            }
        }
    }
    Ok(())
}

fn session_file_info(path: &Path, project_path: &ProjectPath) -> Result<Option<SessionFileInfo>> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let Some(id) = file_name.strip_suffix(".jsonl") else {
        return Ok(None);
    };

    let metadata = fs::metadata(path).with_context(|| format!("metadata for {}", path.display()))?;
    let modified_time_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    Ok(Some(SessionFileInfo {
        id: id.to_string(),
        path: path.to_path_buf(),
        project_path: project_path.clone(),
        modified_time_ms,
        size_bytes: metadata.len(),
    }))
}

/// Reverse lookup: find the path of a session file by id. A full scan is
/// acceptable since this is called rarely (e.g. resolving `--session` on
/// the CLI).
pub fn get_session_file(root: &Path, id: &str) -> Result<Option<PathBuf>> {
    Ok(discover(root)?
        .into_iter()
        .find(|s| s.id == id)
        .map(|s| s.path))
}
