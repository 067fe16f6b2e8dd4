use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Folder under the library root where removed duplicates are parked.
/// Removal is never a true delete.
pub const QUARANTINE_DIR: &str = "_Duplicates_Removed";

/// One catalog row per known audio file, keyed by library-relative path.
///
/// Raw fields come straight from the tag reader, parsed fields from the
/// folder/file name fallback, normalized fields are comparison keys only
/// and must never be displayed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub path: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub raw_artist: Option<String>,
    #[serde(default)]
    pub raw_album: Option<String>,
    #[serde(default)]
    pub raw_title: Option<String>,
    #[serde(default)]
    pub raw_track_number: Option<u32>,
    #[serde(default)]
    pub raw_year: Option<i32>,
    #[serde(default)]
    pub raw_genre: Option<String>,
    pub parsed_artist: String,
    pub parsed_album: String,
    pub parsed_title: String,
    pub normalized_artist: String,
    pub normalized_album: String,
    pub normalized_title: String,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    pub last_seen: u64,
    pub modified: u64,
}

impl TrackRecord {
    /// Display artist: tag value when present, otherwise the parsed fallback.
    pub fn artist(&self) -> &str {
        match self.raw_artist.as_deref() {
            Some(value) if !value.trim().is_empty() => value,
            _ => &self.parsed_artist,
        }
    }

    pub fn album(&self) -> &str {
        match self.raw_album.as_deref() {
            Some(value) if !value.trim().is_empty() => value,
            _ => &self.parsed_album,
        }
    }

    pub fn title(&self) -> &str {
        match self.raw_title.as_deref() {
            Some(value) if !value.trim().is_empty() => value,
            _ => &self.parsed_title,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletenessVerdict {
    Complete,
    Incomplete,
    Partial,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKind {
    Exact,
    Potential,
}

/// A group of records judged to be the same work, by content hash (Exact)
/// or by normalized artist+title (Potential).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSet {
    pub kind: DuplicateKind,
    pub paths: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Rename,
    Move,
    RemoveToQuarantine,
}

/// A single planned filesystem mutation. Created by the planner, consumed
/// by the executor, never mutated in between.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOperation {
    pub source: String,
    pub destination: String,
    pub kind: OperationKind,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub operations: Vec<MoveOperation>,
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

/// Immediate parent folder name of a relative slash path; empty for a file
/// directly under the root.
pub fn parent_folder_name(rel: &str) -> String {
    let mut parts: Vec<&str> = rel.split('/').collect();
    parts.pop();
    parts.pop().map(|s| s.to_string()).unwrap_or_default()
}

/// File name of a relative slash path without its extension.
pub fn file_stem_of(rel: &str) -> String {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name.to_string(),
    }
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::{join_relpath, relpath_from, MoveOperation, OperationKind, Plan};
    use std::path::Path;

    fn assert_full_eq<T: Eq>(_: &T) {}

    #[test]
    fn plans_support_full_equality() {
        let plan = Plan {
            operations: vec![MoveOperation {
                source: "a.mp3".to_string(),
                destination: "Artist - Mixed/a.mp3".to_string(),
                kind: OperationKind::Move,
                reason: "consolidate".to_string(),
            }],
        };
        assert_full_eq(&plan);
        assert_full_eq(&plan.operations[0]);
        assert_eq!(plan, plan.clone());
    }

    #[test]
    fn relpath_round_trips() {
        let root = Path::new("/music");
        let file = Path::new("/music/Artist - Album/01 Song.mp3");
        let rel = relpath_from(root, file).unwrap();
        assert_eq!(rel, "Artist - Album/01 Song.mp3");
        assert_eq!(join_relpath(root, &rel), file);
    }

    #[test]
    fn relpath_outside_root_is_none() {
        assert!(relpath_from(Path::new("/music"), Path::new("/other/x.mp3")).is_none());
    }
}
