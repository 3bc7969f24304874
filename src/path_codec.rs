//! Lossy encoding of filesystem paths into directory names, and a
//! best-effort resolver that walks the real filesystem to recover the
//! project name the encoding alone cannot reliably reproduce.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A project path as seen under the sessions root: the canonical encoded
/// directory name, a best-effort decoded form, and the resolved display
/// name.
///
/// `encoded` is the equality key. `decoded` is informational only: the
/// encoding collapses `:\`, `\`, `/`, and space all onto `-`, so decoding is
/// inherently ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectPath {
    encoded: String,
    decoded: String,
    project_name: String,
}

impl ProjectPath {
    /// Build from an already-encoded directory name (e.g. a directory found
    /// under the sessions root).
    pub fn from_encoded(encoded: &str) -> Option<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return None;
        }
        let decoded = decode(encoded);
        let project_name = last_segment(encoded).to_string();
        Some(ProjectPath {
            encoded: encoded.to_string(),
            decoded,
            project_name,
        })
    }

    /// Build from a real filesystem path, applying the lossy encoding.
    pub fn from_real_path(path: &str) -> Option<Self> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        Self::from_encoded(&encode(path))
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn decoded(&self) -> &str {
        &self.decoded
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Replace the resolved display name, e.g. after a successful
    /// filesystem walk in [`NameResolver`].
    pub fn with_project_name(mut self, name: String) -> Self {
        self.project_name = name;
        self
    }
}

/// Encode a decoded path into its directory-name form: `:\` becomes `--`,
/// any remaining `\` or `/` becomes `-`, and space becomes `-`.
pub fn encode(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ':' && chars.get(i + 1) == Some(&'\\') {
            out.push('-');
            out.push('-');
            i += 2;
            continue;
        }
        match chars[i] {
            '\\' | '/' | ' ' => out.push('-'),
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Best-effort decode. Informational only; not guaranteed to reconstruct
/// the original path because the encoding is not injective.
pub fn decode(encoded: &str) -> String {
    if is_windows_drive_form(encoded) {
        let mut chars = encoded.chars();
        let drive = chars.next().unwrap();
        let rest: String = chars.as_str().strip_prefix("--").unwrap_or("").to_string();
        format!("{drive}:\\{}", rest.replace('-', "\\"))
    } else {
        format!("/{}", encoded.replace('-', "/"))
    }
}

fn is_windows_drive_form(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic()) && s.get(1..3) == Some("--")
}

fn last_segment(encoded: &str) -> &str {
    encoded.rsplit('-').next().unwrap_or(encoded)
}

/// Walks the real filesystem under a configured root to recover a project's
/// true name from its lossily-encoded directory, using a greedy
/// longest-match strategy against real subdirectory listings. Caches
/// per-directory listings and final resolutions so repeated lookups after
/// the first are effectively O(depth).
pub struct NameResolver {
    root: PathBuf,
    listing_cache: Mutex<HashMap<PathBuf, Vec<String>>>,
    resolution_cache: Mutex<HashMap<String, String>>,
}

impl NameResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        NameResolver {
            root: root.into(),
            listing_cache: Mutex::new(HashMap::new()),
            resolution_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the encoded path (drive-prefix already stripped by the
    /// caller if present) to its true project name. Falls back to the
    /// naive last-segment split when no real directory matches.
    pub fn resolve(&self, encoded: &str) -> String {
        if let Some(cached) = self.resolution_cache.lock().unwrap().get(encoded) {
            return cached.clone();
        }
        let resolved = self
            .resolve_at(&self.root, encoded)
            .unwrap_or_else(|| last_segment(encoded).to_string());
        self.resolution_cache
            .lock()
            .unwrap()
            .insert(encoded.to_string(), resolved.clone());
        resolved
    }

    fn resolve_at(&self, dir: &Path, remaining: &str) -> Option<String> {
        let listing = self.list_dir(dir);
        let mut candidates: Vec<&String> = listing.iter().collect();
        candidates.sort_by_key(|name| std::cmp::Reverse(encode(name).len()));

        for name in &candidates {
            let enc = encode(name);
            if enc == remaining {
                return Some((*name).clone());
            }
            if let Some(rest) = remaining.strip_prefix(&format!("{enc}-")) {
                if let Some(found) = self.resolve_at(&dir.join(name), rest) {
                    return Some(found);
                }
                // Matched this level but nothing deeper resolved; still a
                // real directory, so trust it over a final fallback.
                return Some((*name).clone());
            }
        }

        // Some platforms hide directories from readdir but still resolve
        // them via stat. Probe increasing prefix lengths of the dash-split
        // remainder directly against the filesystem.
        let segments: Vec<&str> = remaining.split('-').collect();
        for k in 1..segments.len() {
            let candidate = segments[..k].join("-");
            let candidate_path = dir.join(&candidate);
            if candidate_path.is_dir() {
                let rest = segments[k..].join("-");
                if rest.is_empty() {
                    return Some(candidate);
                }
                if let Some(found) = self.resolve_at(&candidate_path, &rest) {
                    return Some(found);
                }
                return Some(candidate);
            }
        }

        None
    }

    fn list_dir(&self, dir: &Path) -> Vec<String> {
        if let Some(cached) = self.listing_cache.lock().unwrap().get(dir) {
            return cached.clone();
        }
        let mut names = Vec::new();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        self.listing_cache
            .lock()
            .unwrap()
            .insert(dir.to_path_buf(), names.clone());
        names
    }
}
