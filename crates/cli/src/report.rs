use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::path::Path;

use analysis::completeness::AlbumKey;
use analysis::{DuplicateReport, MixedDuplicate};
use catalog::ScanSummary;
use common::{CompletenessVerdict, TrackRecord};
use organize::{ExecutionLog, OperationOutcome};

pub fn print_scan_summary(summary: &ScanSummary) {
    println!("Scan complete:");
    println!("  New files:           {}", summary.added);
    println!("  Updated:             {}", summary.updated);
    println!("  Skipped (unchanged): {}", summary.skipped);
    println!("  Removed (stale):     {}", summary.removed);
    println!("  Unreadable media:    {}", summary.unreadable);
    println!("  Failed:              {}", summary.failed);
    if summary.cancelled {
        println!("  Scan was cancelled before completion.");
    }
}

pub fn print_stats(records: &[TrackRecord]) {
    println!("Catalog statistics");
    println!("  Tracks: {}", records.len());

    let total_bytes: u64 = records.iter().map(|r| r.size_bytes).sum();
    println!(
        "  Total size: {:.2} GB",
        total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    );

    let total_seconds: f64 = records.iter().filter_map(|r| r.duration_seconds).sum();
    let hours = (total_seconds / 3600.0) as u64;
    let minutes = ((total_seconds % 3600.0) / 60.0) as u64;
    println!("  Total duration: {} hours, {} minutes", hours, minutes);

    let mut by_ext: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        let ext = record
            .path
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        *by_ext.entry(ext).or_default() += 1;
    }
    println!("  By format:");
    for (ext, count) in &by_ext {
        println!("    .{}: {}", ext, count);
    }

    let artists: BTreeSet<&str> = records
        .iter()
        .map(|r| r.normalized_artist.as_str())
        .filter(|a| !a.is_empty())
        .collect();
    println!("  Unique artists: {}", artists.len());

    let mut per_artist: BTreeMap<&str, (usize, &str)> = BTreeMap::new();
    for record in records {
        if record.normalized_artist.is_empty() {
            continue;
        }
        let entry = per_artist
            .entry(&record.normalized_artist)
            .or_insert((0, record.artist()));
        entry.0 += 1;
    }
    let mut top: Vec<_> = per_artist.values().collect();
    top.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    println!("  Top artists:");
    for (count, name) in top.into_iter().take(10) {
        println!("    {}: {} tracks", name, count);
    }

    let albums: BTreeSet<(&str, &str)> = records
        .iter()
        .filter(|r| !r.normalized_album.is_empty())
        .map(|r| (r.normalized_artist.as_str(), r.normalized_album.as_str()))
        .collect();
    println!("  Unique albums: {}", albums.len());

    let missing = records
        .iter()
        .filter(|r| {
            r.raw_artist.as_deref().unwrap_or("").trim().is_empty()
                || r.raw_title.as_deref().unwrap_or("").trim().is_empty()
        })
        .count();
    if missing > 0 {
        println!("  Tracks with missing tags: {}", missing);
    }
}

pub fn print_duplicates(records: &[TrackRecord], report: &DuplicateReport) {
    let by_path: BTreeMap<&str, &TrackRecord> =
        records.iter().map(|r| (r.path.as_str(), r)).collect();

    println!("Exact duplicates (identical content): {}", report.exact.len());
    for set in &report.exact {
        println!("  Group of {}:", set.paths.len());
        for path in &set.paths {
            print_duplicate_line(&by_path, path);
        }
    }

    println!(
        "Potential duplicates (same artist + title): {}",
        report.potential.len()
    );
    for set in &report.potential {
        println!("  Group of {}:", set.paths.len());
        for path in &set.paths {
            print_duplicate_line(&by_path, path);
        }
    }

    if report.exact.is_empty() && report.potential.is_empty() {
        println!("No duplicates found.");
    }
}

fn print_duplicate_line(by_path: &BTreeMap<&str, &TrackRecord>, path: &str) {
    match by_path.get(path) {
        Some(record) => {
            let duration = record
                .duration_seconds
                .map(format_duration)
                .unwrap_or_else(|| "?".to_string());
            let bitrate = record
                .bitrate
                .map(|b| format!("{}kbps", b))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "    [{}, {}] {} - {}  ({})",
                duration,
                bitrate,
                record.artist(),
                record.title(),
                path
            );
        }
        None => println!("    {}", path),
    }
}

pub fn print_mixed_duplicates(duplicates: &[MixedDuplicate]) {
    if duplicates.is_empty() {
        println!("No duplicates found between Mixed folders and complete albums.");
        return;
    }
    println!(
        "{} tracks in Mixed folders also exist in complete albums:",
        duplicates.len()
    );
    for duplicate in duplicates {
        println!("  REMOVE: {}", duplicate.mixed_path);
        for kept in &duplicate.album_paths {
            println!("  KEEP:   {}", kept);
        }
    }
}

pub fn print_partial_albums(
    records: &[TrackRecord],
    verdicts: &BTreeMap<AlbumKey, CompletenessVerdict>,
) {
    let groups = analysis::group_albums(records);
    let mut count = 0;
    for (key, verdict) in verdicts {
        if *verdict != CompletenessVerdict::Partial {
            continue;
        }
        count += 1;
        let members = match groups.get(key) {
            Some(members) => members,
            None => continue,
        };
        let numbers: BTreeSet<u32> = members.iter().filter_map(|t| t.raw_track_number).collect();
        let (min, max) = match (numbers.first(), numbers.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => continue,
        };
        let missing: Vec<String> = (min..=max)
            .filter(|n| !numbers.contains(n))
            .map(|n| n.to_string())
            .collect();
        let sample = members.first().map(|t| t.artist()).unwrap_or("?");
        let album = members.first().map(|t| t.album()).unwrap_or("?");
        println!(
            "  {} - {}: {} tracks, missing {}",
            sample,
            album,
            members.len(),
            missing.join(", ")
        );
    }
    if count == 0 {
        println!("No partial albums found.");
    } else {
        println!("{} partial albums.", count);
    }
}

pub fn print_execution(log: &ExecutionLog, preview: bool) {
    if preview {
        println!("Preview: {} operations would run.", log.entries.len());
        for entry in &log.entries {
            println!(
                "  {:?}: {} -> {}",
                entry.operation.kind, entry.operation.source, entry.operation.destination
            );
        }
        return;
    }
    let quarantined = log
        .entries
        .iter()
        .filter(|e| {
            e.outcome == OperationOutcome::Applied
                && e.operation.kind == common::OperationKind::RemoveToQuarantine
        })
        .count();
    println!("Execution complete:");
    println!("  Moved:       {}", log.applied - quarantined);
    println!("  Quarantined: {}", quarantined);
    println!("  Skipped:     {}", log.skipped);
    println!("  Failed:      {}", log.failed);
    for entry in &log.entries {
        if let OperationOutcome::Failed(reason) = &entry.outcome {
            println!("  FAILED {}: {}", entry.operation.source, reason);
        }
    }
}

pub fn export_csv(records: &[TrackRecord], path: &Path) -> Result<(), Box<dyn Error>> {
    let mut records: Vec<&TrackRecord> = records.iter().collect();
    records.sort_by(|a, b| {
        (a.artist(), a.album(), a.raw_track_number, a.title())
            .cmp(&(b.artist(), b.album(), b.raw_track_number, b.title()))
    });

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Artist", "Album", "Title", "Track", "Year", "Genre", "Duration", "Bitrate", "Path",
    ])?;
    for record in records {
        writer.write_record([
            record.artist(),
            record.album(),
            record.title(),
            &record
                .raw_track_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            &record.raw_year.map(|y| y.to_string()).unwrap_or_default(),
            record.raw_genre.as_deref().unwrap_or(""),
            &record
                .duration_seconds
                .map(format_duration)
                .unwrap_or_default(),
            &record
                .bitrate
                .map(|b| format!("{}kbps", b))
                .unwrap_or_default(),
            &record.path,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
