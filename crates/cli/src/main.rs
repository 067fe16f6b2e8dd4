mod config;
mod report;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analysis::{classify_all, duplicates_in_mixed, find_duplicates, NormalizeConfig};
use catalog::{scan, CatalogStore, ScanOptions};
use clap::{Parser, Subcommand};
use common::{file_stem_of, parent_folder_name, OperationKind, TrackRecord};
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path, AppConfig};
use metadata::LoftyTagSource;
use organize::{build_plan, execute, ExecutionMode, OperationOutcome, PlanOptions};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tonekeep", about = "Catalog, deduplicate and reorganize a music collection")]
struct Cli {
    /// Config file path. Defaults to $TONEKEEP_CONFIG or tonekeep.yaml
    /// next to the binary.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the music root and refresh the catalog.
    Scan {
        /// Re-read tags even for files whose size and mtime are unchanged.
        #[arg(long)]
        rescan: bool,
    },
    /// Print collection statistics.
    Stats,
    /// List exact and potential duplicate sets.
    ListDuplicates,
    /// Export the catalog to a CSV file.
    Export {
        /// Output file path.
        path: PathBuf,
    },
    /// Build a reorganization plan. Preview is the default; nothing moves
    /// without --execute.
    Plan {
        #[arg(long, conflicts_with = "execute")]
        preview: bool,
        #[arg(long)]
        execute: bool,
        /// Override the album completeness threshold for this run.
        #[arg(long)]
        min_tracks: Option<usize>,
    },
    /// List Mixed-folder tracks that also exist in a complete album.
    ListDuplicatesInMixed,
    /// Quarantine Mixed-folder tracks confirmed duplicated in complete albums.
    RemoveDuplicates {
        #[arg(long)]
        execute: bool,
    },
    /// List albums with a gap in their track numbering.
    FindPartial,
    /// Rename partial album folders with a " (partial)" suffix.
    MarkPartial {
        #[arg(long, conflicts_with = "execute")]
        preview: bool,
        #[arg(long)]
        execute: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config_path_from_env);
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
        println!(
            "Created {}. Set music_root there and run again.",
            config_path.display()
        );
        return Ok(());
    }
    info!("Loaded config from {:?}", config_path);

    let music_root = match resolve_music_root(&config_path, &config.music_root) {
        Some(root) => root,
        None => {
            eprintln!(
                "music_root is not set in {}. Nothing to do.",
                config_path.display()
            );
            std::process::exit(2);
        }
    };
    let catalog_path = resolve_path(&config_path, &config.catalog_path);
    let store = CatalogStore::open(&catalog_path)?;

    match cli.command {
        Command::Scan { rescan } => run_scan(&music_root, &store, &config, rescan)?,
        Command::Stats => report::print_stats(&store.all()?),
        Command::ListDuplicates => {
            let records = store.all()?;
            report::print_duplicates(&records, &find_duplicates(&records));
        }
        Command::Export { path } => {
            let records = store.all()?;
            report::export_csv(&records, &path)?;
            println!("Exported {} tracks to {}", records.len(), path.display());
        }
        Command::Plan {
            preview: _,
            execute,
            min_tracks,
        } => {
            let options = PlanOptions::default();
            run_plan(&music_root, &store, &config, &options, min_tracks, execute)?;
        }
        Command::ListDuplicatesInMixed => {
            let records = store.all()?;
            let verdicts = classify_all(&records, config.min_tracks);
            report::print_mixed_duplicates(&duplicates_in_mixed(&records, &verdicts));
        }
        Command::RemoveDuplicates { execute } => {
            let options = PlanOptions {
                include_moves: false,
                partial_only: false,
                quarantine_duplicates: true,
            };
            run_plan(&music_root, &store, &config, &options, None, execute)?;
        }
        Command::FindPartial => {
            let records = store.all()?;
            let verdicts = classify_all(&records, config.min_tracks);
            report::print_partial_albums(&records, &verdicts);
        }
        Command::MarkPartial {
            preview: _,
            execute,
        } => {
            let options = PlanOptions {
                include_moves: true,
                partial_only: true,
                quarantine_duplicates: false,
            };
            run_plan(&music_root, &store, &config, &options, None, execute)?;
        }
    }

    Ok(())
}

fn run_scan(
    music_root: &Path,
    store: &CatalogStore,
    config: &AppConfig,
    rescan: bool,
) -> Result<(), Box<dyn Error>> {
    if !music_root.is_dir() {
        return Err(format!("music root {} is not a directory", music_root.display()).into());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Ctrl-C handler unavailable: {}", err);
    }

    let options = ScanOptions {
        rescan,
        workers: config.scan_workers,
        cancel: Some(cancel),
    };
    let tags = LoftyTagSource;
    let summary = scan(music_root, store, &tags, &config.normalize, &options)?;
    report::print_scan_summary(&summary);
    Ok(())
}

fn run_plan(
    music_root: &Path,
    store: &CatalogStore,
    config: &AppConfig,
    options: &PlanOptions,
    min_tracks: Option<usize>,
    apply: bool,
) -> Result<(), Box<dyn Error>> {
    let records = store.all()?;
    if records.is_empty() {
        println!("Catalog is empty. Run `tonekeep scan` first.");
        return Ok(());
    }

    let min_tracks = min_tracks.unwrap_or(config.min_tracks);
    let verdicts = classify_all(&records, min_tracks);
    let mixed = if options.quarantine_duplicates {
        duplicates_in_mixed(&records, &verdicts)
    } else {
        Vec::new()
    };
    let plan = build_plan(&records, &verdicts, &mixed, &config.normalize, options)?;

    if plan.operations.is_empty() {
        println!("Nothing to do. The library already matches the target layout.");
        return Ok(());
    }

    let mode = if apply {
        ExecutionMode::Execute
    } else {
        ExecutionMode::Preview
    };
    let log = execute(music_root, &plan, mode);
    report::print_execution(&log, !apply);
    if !apply {
        println!("Re-run with --execute to apply.");
        return Ok(());
    }

    sync_catalog(store, &log, &records, &config.normalize)?;
    Ok(())
}

/// Mirrors applied filesystem operations into the catalog so the next scan
/// sees a consistent store. Quarantined files leave the catalog entirely;
/// the quarantine folder is excluded from scans. Moved records get their
/// parsed and normalized fields re-derived from the new path, matching what
/// a rescan would produce.
fn sync_catalog(
    store: &CatalogStore,
    log: &organize::ExecutionLog,
    records: &[TrackRecord],
    normalize: &NormalizeConfig,
) -> Result<(), Box<dyn Error>> {
    let known = |path: &str| records.iter().any(|r| r.path == path);
    for entry in &log.entries {
        if entry.outcome != OperationOutcome::Applied {
            continue;
        }
        match entry.operation.kind {
            OperationKind::RemoveToQuarantine => {
                store.remove(&entry.operation.source)?;
            }
            OperationKind::Move | OperationKind::Rename => {
                if known(&entry.operation.source) {
                    store.rekey(&entry.operation.source, &entry.operation.destination)?;
                    refresh_derived_fields(store, &entry.operation.destination, normalize)?;
                }
            }
        }
    }
    Ok(())
}

fn refresh_derived_fields(
    store: &CatalogStore,
    path: &str,
    normalize: &NormalizeConfig,
) -> Result<(), Box<dyn Error>> {
    let mut record = match store.get(path)? {
        Some(record) => record,
        None => return Ok(()),
    };
    let fields = normalize.normalize(
        record.raw_artist.as_deref(),
        record.raw_album.as_deref(),
        record.raw_title.as_deref(),
        &parent_folder_name(path),
        &file_stem_of(path),
    );
    record.parsed_artist = fields.parsed_artist;
    record.parsed_album = fields.parsed_album;
    record.parsed_title = fields.parsed_title;
    record.normalized_artist = fields.normalized_artist;
    record.normalized_album = fields.normalized_album;
    record.normalized_title = fields.normalized_title;
    store.upsert(&record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{now_secs, MoveOperation};
    use organize::{ExecutionLog, LogEntry};

    fn untagged(path: &str, normalize: &NormalizeConfig) -> TrackRecord {
        let fields = normalize.normalize(
            None,
            None,
            None,
            &parent_folder_name(path),
            &file_stem_of(path),
        );
        TrackRecord {
            path: path.to_string(),
            size_bytes: 1,
            content_hash: Some("h".to_string()),
            raw_artist: None,
            raw_album: None,
            raw_title: None,
            raw_track_number: None,
            raw_year: None,
            raw_genre: None,
            parsed_artist: fields.parsed_artist,
            parsed_album: fields.parsed_album,
            parsed_title: fields.parsed_title,
            normalized_artist: fields.normalized_artist,
            normalized_album: fields.normalized_album,
            normalized_title: fields.normalized_title,
            duration_seconds: None,
            bitrate: None,
            last_seen: now_secs(),
            modified: 0,
        }
    }

    fn applied(operation: MoveOperation) -> ExecutionLog {
        ExecutionLog {
            entries: vec![LogEntry {
                operation,
                outcome: OperationOutcome::Applied,
                at: now_secs(),
            }],
            applied: 1,
            skipped: 0,
            failed: 0,
        }
    }

    #[test]
    fn executed_move_rekeys_and_rederives_parsed_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        let cfg = NormalizeConfig::default();

        let record = untagged("loose/track07.mp3", &cfg);
        store.upsert(&record).unwrap();

        let log = applied(MoveOperation {
            source: "loose/track07.mp3".to_string(),
            destination: "Artist - Mixed/Artist - Something.mp3".to_string(),
            kind: OperationKind::Move,
            reason: "consolidate".to_string(),
        });
        sync_catalog(&store, &log, &[record], &cfg).unwrap();

        assert!(store.get("loose/track07.mp3").unwrap().is_none());
        let moved = store
            .get("Artist - Mixed/Artist - Something.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(moved.parsed_artist, "Artist");
        assert_eq!(moved.parsed_title, "Something");
        assert_eq!(moved.normalized_title, "something");
    }

    #[test]
    fn quarantined_record_leaves_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        let cfg = NormalizeConfig::default();

        let record = untagged("loose/dup.mp3", &cfg);
        store.upsert(&record).unwrap();

        let log = applied(MoveOperation {
            source: "loose/dup.mp3".to_string(),
            destination: format!("{}/dup.mp3", common::QUARANTINE_DIR),
            kind: OperationKind::RemoveToQuarantine,
            reason: "duplicate".to_string(),
        });
        sync_catalog(&store, &log, &[record], &cfg).unwrap();
        assert!(store.get("loose/dup.mp3").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }
}
