use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::UNIX_EPOCH;

use analysis::NormalizeConfig;
use common::{file_stem_of, now_secs, parent_folder_name, relpath_from, TrackRecord, QUARANTINE_DIR};
use crossbeam_channel::unbounded;
use metadata::{MetadataError, RawTags, TagSource};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::fingerprint::fingerprint;
use crate::store::CatalogStore;
use crate::CatalogError;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg", "wma", "aac"];

#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Re-read tags for every file even when size+mtime are unchanged.
    /// Unchanged files still reuse their stored content hash.
    pub rescan: bool,
    /// Fingerprint worker threads. Hashing dominates scan cost and the
    /// files are disjoint, so this parallelism is safe.
    pub workers: usize,
    /// Checked between files, never mid-hash. Each file is either fully
    /// upserted or untouched when a scan stops early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            rescan: false,
            workers: 4,
            cancel: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub unreadable: usize,
    pub failed: usize,
    pub cancelled: bool,
}

struct WorkItem {
    abs: PathBuf,
    rel: String,
    size: u64,
    modified: u64,
    reuse_hash: Option<String>,
}

enum WorkOutcome {
    Ready {
        rel: String,
        size: u64,
        modified: u64,
        tags: RawTags,
        content_hash: String,
    },
    Unreadable {
        rel: String,
    },
    HashFailed {
        rel: String,
    },
}

/// Walks the library, upserts changed files, refreshes unchanged ones and
/// prunes records whose path no longer exists.
pub fn scan(
    root: &Path,
    store: &CatalogStore,
    tags: &(dyn TagSource + Sync),
    normalize: &NormalizeConfig,
    options: &ScanOptions,
) -> Result<ScanSummary, CatalogError> {
    let now = now_secs();
    let mut summary = ScanSummary::default();

    let existing: BTreeMap<String, (u64, u64, Option<String>)> = store
        .all()?
        .into_iter()
        .map(|r| (r.path.clone(), (r.size_bytes, r.modified, r.content_hash)))
        .collect();

    let mut found: BTreeSet<String> = BTreeSet::new();
    let mut work: Vec<WorkItem> = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Walk error under {:?}: {}", root, err);
                summary.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }
        let rel = match relpath_from(root, entry.path()) {
            Some(rel) => rel,
            None => continue,
        };

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Failed to stat {:?}: {}", entry.path(), err);
                summary.failed += 1;
                continue;
            }
        };
        let size = meta.len();
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        found.insert(rel.clone());

        let unchanged = existing
            .get(&rel)
            .map(|(old_size, old_modified, _)| *old_size == size && *old_modified == modified)
            .unwrap_or(false);

        if unchanged && !options.rescan {
            store.touch(&rel, now)?;
            summary.skipped += 1;
            continue;
        }

        // The incremental-scan invariant: the hash is recomputed only when
        // size or mtime changed since the last scan.
        let reuse_hash = if unchanged {
            existing.get(&rel).and_then(|(_, _, hash)| hash.clone())
        } else {
            None
        };

        work.push(WorkItem {
            abs: entry.path().to_path_buf(),
            rel,
            size,
            modified,
            reuse_hash,
        });
    }

    let worker_count = options.workers.clamp(1, work.len().max(1));
    let cancel = options.cancel.clone();
    let (work_tx, work_rx) = unbounded::<WorkItem>();
    let (done_tx, done_rx) = unbounded::<WorkOutcome>();

    for item in work {
        // Channel send to an open unbounded channel cannot fail here.
        let _ = work_tx.send(item);
    }
    drop(work_tx);

    thread::scope(|scope| -> Result<(), CatalogError> {
        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                for item in work_rx.iter() {
                    if is_cancelled(&cancel) {
                        break;
                    }
                    let outcome = process_file(item, tags);
                    if done_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);
        drop(work_rx);

        for outcome in done_rx.iter() {
            match outcome {
                WorkOutcome::Ready {
                    rel,
                    size,
                    modified,
                    tags: raw,
                    content_hash,
                } => {
                    let record =
                        build_record(rel, size, modified, raw, content_hash, normalize, now);
                    let is_new = !existing.contains_key(&record.path);
                    store.upsert(&record)?;
                    if is_new {
                        info!("Added {}", record.path);
                        summary.added += 1;
                    } else {
                        info!("Updated {}", record.path);
                        summary.updated += 1;
                    }
                }
                WorkOutcome::Unreadable { rel } => {
                    summary.unreadable += 1;
                    // A previously cataloged record stays; the file is
                    // still on disk, just unreadable right now.
                    let _ = rel;
                }
                WorkOutcome::HashFailed { rel } => {
                    summary.failed += 1;
                    let _ = rel;
                }
            }
        }
        Ok(())
    })?;

    if is_cancelled(&cancel) {
        summary.cancelled = true;
        info!("Scan cancelled; stale records left for the next run");
        return Ok(summary);
    }

    for path in existing.keys() {
        if !found.contains(path) {
            if store.remove(path)? {
                info!("Pruned stale record {}", path);
                summary.removed += 1;
            }
        }
    }

    Ok(summary)
}

fn process_file(item: WorkItem, tags: &(dyn TagSource + Sync)) -> WorkOutcome {
    let raw = match tags.read(&item.abs) {
        Ok(raw) => raw,
        Err(err) => {
            log_unreadable(&item.abs, &err);
            return WorkOutcome::Unreadable { rel: item.rel };
        }
    };

    let content_hash = match item.reuse_hash {
        Some(hash) => hash,
        None => match fingerprint(&item.abs) {
            Ok(fp) => fp.content_hash,
            Err(err) => {
                warn!("Failed to hash {:?}: {}", item.abs, err);
                return WorkOutcome::HashFailed { rel: item.rel };
            }
        },
    };

    WorkOutcome::Ready {
        rel: item.rel,
        size: item.size,
        modified: item.modified,
        tags: raw,
        content_hash,
    }
}

fn log_unreadable(path: &Path, err: &MetadataError) {
    warn!("Unreadable media {:?}: {}", path, err);
}

fn build_record(
    rel: String,
    size: u64,
    modified: u64,
    raw: RawTags,
    content_hash: String,
    normalize: &NormalizeConfig,
    now: u64,
) -> TrackRecord {
    let folder_name = parent_folder_name(&rel);
    let file_stem = file_stem_of(&rel);
    let fields = normalize.normalize(
        raw.artist.as_deref(),
        raw.album.as_deref(),
        raw.title.as_deref(),
        &folder_name,
        &file_stem,
    );

    TrackRecord {
        path: rel,
        size_bytes: size,
        content_hash: Some(content_hash),
        raw_artist: raw.artist,
        raw_album: raw.album,
        raw_title: raw.title,
        raw_track_number: raw.track_number,
        raw_year: raw.year,
        raw_genre: raw.genre,
        parsed_artist: fields.parsed_artist,
        parsed_album: fields.parsed_album,
        parsed_title: fields.parsed_title,
        normalized_artist: fields.normalized_artist,
        normalized_album: fields.normalized_album,
        normalized_title: fields.normalized_title,
        duration_seconds: raw.duration_seconds,
        bitrate: raw.bitrate,
        last_seen: now,
        modified,
    }
}

fn is_cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
    cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn is_excluded_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    (name.starts_with('.') && entry.depth() > 0) || name == QUARANTINE_DIR
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
