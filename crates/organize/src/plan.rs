use std::collections::{BTreeMap, BTreeSet};

use analysis::completeness::AlbumKey;
use analysis::normalize::{comparison_key, sanitize_component, NormalizeConfig};
use analysis::MixedDuplicate;
use common::{
    CompletenessVerdict, MoveOperation, OperationKind, Plan, TrackRecord, QUARANTINE_DIR,
};

/// Free-name search stops here; running out means the disambiguation
/// contract is broken and the plan must fail loudly rather than overwrite.
const MAX_SUFFIX_ATTEMPTS: usize = 1000;

#[derive(Clone, Copy, Debug)]
pub struct PlanOptions {
    /// Emit rename/consolidation moves.
    pub include_moves: bool,
    /// Restrict moves to Partial albums (the mark-partial command).
    pub partial_only: bool,
    /// Emit quarantine operations for confirmed Mixed duplicates.
    pub quarantine_duplicates: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            include_moves: true,
            partial_only: false,
            quarantine_duplicates: true,
        }
    }
}

#[derive(Debug)]
pub enum PlanError {
    ConflictUnresolved { destination: String },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::ConflictUnresolved { destination } => {
                write!(f, "no free disambiguated name near {}", destination)
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Builds the reorganization plan. Pure: reads only the catalog snapshot
/// and classifications, never the disk. Given the same inputs the output
/// is identical, operation for operation.
pub fn build_plan(
    records: &[TrackRecord],
    verdicts: &BTreeMap<AlbumKey, CompletenessVerdict>,
    mixed_duplicates: &[MixedDuplicate],
    config: &NormalizeConfig,
    options: &PlanOptions,
) -> Result<Plan, PlanError> {
    let mut records: Vec<&TrackRecord> = records.iter().collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));

    // Every live path claims its name until its own operation vacates it,
    // so no destination can collide with a still-pending source.
    let mut taken: BTreeSet<String> = records.iter().map(|r| r.path.clone()).collect();

    let artist_surfaces = preferred_artist_surfaces(&records, config);
    let album_surfaces = album_surfaces(&records);

    let mut operations = Vec::new();
    let mut quarantined: BTreeSet<&str> = BTreeSet::new();

    if options.quarantine_duplicates {
        for duplicate in mixed_duplicates {
            if !taken.contains(&duplicate.mixed_path) {
                continue;
            }
            let file_name = file_name_of(&duplicate.mixed_path);
            let base = format!("{}/{}", QUARANTINE_DIR, file_name);
            let destination = free_name(&base, &duplicate.mixed_path, &taken)?;
            taken.remove(&duplicate.mixed_path);
            taken.insert(destination.clone());
            quarantined.insert(&duplicate.mixed_path);
            let kept = duplicate
                .album_paths
                .first()
                .map(|p| p.as_str())
                .unwrap_or("");
            operations.push(MoveOperation {
                source: duplicate.mixed_path.clone(),
                destination,
                kind: OperationKind::RemoveToQuarantine,
                reason: format!("complete-album copy kept at {}", kept),
            });
        }
    }

    if options.include_moves {
        for record in &records {
            if quarantined.contains(record.path.as_str()) {
                continue;
            }
            let key = (
                record.normalized_artist.clone(),
                record.normalized_album.clone(),
            );
            let verdict = verdicts
                .get(&key)
                .copied()
                .unwrap_or(CompletenessVerdict::Unknown);
            if options.partial_only && verdict != CompletenessVerdict::Partial {
                continue;
            }

            let artist = artist_surfaces
                .get(&record.normalized_artist)
                .map(|s| config.folder_artist(s))
                .unwrap_or_else(|| "Unknown".to_string());
            let artist = sanitize_component(&artist);
            let album = album_surfaces
                .get(&key)
                .map(|s| sanitize_component(s))
                .unwrap_or_else(|| "Unknown".to_string());

            let (folder, reason) = match verdict {
                CompletenessVerdict::Complete => {
                    (format!("{} - {}", artist, album), "complete album")
                }
                CompletenessVerdict::Partial => (
                    format!("{} - {} (partial)", artist, album),
                    "partial album, gap in track numbering",
                ),
                CompletenessVerdict::Incomplete | CompletenessVerdict::Unknown => (
                    format!("{} - Mixed", artist),
                    "consolidate incomplete album",
                ),
            };

            let title = sanitize_component(record.title());
            let base = match extension_of(&record.path) {
                Some(ext) => format!("{}/{} - {}.{}", folder, artist, title, ext),
                None => format!("{}/{} - {}", folder, artist, title),
            };
            if base == record.path {
                continue;
            }

            let destination = free_name(&base, &record.path, &taken)?;
            if destination == record.path {
                continue;
            }
            taken.remove(&record.path);
            taken.insert(destination.clone());

            let kind = if parent_of(&record.path) == parent_of(&destination) {
                OperationKind::Rename
            } else {
                OperationKind::Move
            };
            operations.push(MoveOperation {
                source: record.path.clone(),
                destination,
                kind,
                reason: reason.to_string(),
            });
        }
    }

    Ok(Plan { operations })
}

/// Picks the display surface for each normalized artist: the corrections
/// table wins, otherwise the best-cased, most common catalog variant.
fn preferred_artist_surfaces(
    records: &[&TrackRecord],
    config: &NormalizeConfig,
) -> BTreeMap<String, String> {
    let mut variants: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for record in records {
        if record.normalized_artist.is_empty() {
            continue;
        }
        *variants
            .entry(&record.normalized_artist)
            .or_default()
            .entry(record.artist())
            .or_default() += 1;
    }

    let mut out = BTreeMap::new();
    for (normalized, surfaces) in variants {
        // The group key is the corrected name's comparison key, but
        // corrections are keyed by the misspelling. Check both: the group
        // key directly, then each raw catalog variant's own key.
        let corrected = config.artist_corrections.get(normalized).or_else(|| {
            surfaces
                .keys()
                .find_map(|surface| config.artist_corrections.get(&comparison_key(surface)))
        });
        if let Some(corrected) = corrected {
            out.insert(normalized.to_string(), corrected.clone());
            continue;
        }
        let best = surfaces
            .iter()
            .max_by_key(|(surface, count)| {
                let starts_upper = surface
                    .chars()
                    .next()
                    .map(|c| c.is_uppercase())
                    .unwrap_or(false);
                let well_cased = is_title_cased(surface) || surface.starts_with("The ");
                (starts_upper, well_cased, **count, std::cmp::Reverse(surface.to_string()))
            })
            .map(|(surface, _)| surface.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        out.insert(normalized.to_string(), best);
    }
    out
}

/// One display album title per album group: the most common surface,
/// lexicographically smallest on ties.
fn album_surfaces(records: &[&TrackRecord]) -> BTreeMap<AlbumKey, String> {
    let mut counts: BTreeMap<AlbumKey, BTreeMap<&str, usize>> = BTreeMap::new();
    for record in records {
        let key = (
            record.normalized_artist.clone(),
            record.normalized_album.clone(),
        );
        *counts.entry(key).or_default().entry(record.album()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(key, surfaces)| {
            let best = surfaces
                .iter()
                .max_by_key(|(surface, count)| (**count, std::cmp::Reverse(surface.to_string())))
                .map(|(surface, _)| surface.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            (key, best)
        })
        .collect()
}

fn is_title_cased(value: &str) -> bool {
    value.split_whitespace().all(|word| {
        word.chars()
            .next()
            .map(|c| !c.is_lowercase())
            .unwrap_or(true)
    })
}

/// Smallest-unused-integer suffixing: "name.mp3", "name (1).mp3", ...
/// Deterministic given a stable candidate order.
fn free_name(base: &str, source: &str, taken: &BTreeSet<String>) -> Result<String, PlanError> {
    if base == source || !taken.contains(base) {
        return Ok(base.to_string());
    }
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            (stem.to_string(), Some(ext.to_string()))
        }
        _ => (base.to_string(), None),
    };
    for counter in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        if candidate == source || !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(PlanError::ConflictUnresolved {
        destination: base.to_string(),
    })
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

fn extension_of(path: &str) -> Option<&str> {
    file_name_of(path).rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis::{classify_all, duplicates_in_mixed};
    use common::now_secs;

    fn track(path: &str, artist: &str, album: &str, title: &str, no: Option<u32>) -> TrackRecord {
        TrackRecord {
            path: path.to_string(),
            size_bytes: 1,
            content_hash: Some(format!("hash-{}", path)),
            raw_artist: Some(artist.to_string()),
            raw_album: Some(album.to_string()),
            raw_title: Some(title.to_string()),
            raw_track_number: no,
            raw_year: None,
            raw_genre: None,
            parsed_artist: artist.to_string(),
            parsed_album: album.to_string(),
            parsed_title: title.to_string(),
            normalized_artist: analysis::normalize::comparison_key(artist),
            normalized_album: analysis::normalize::comparison_key(album),
            normalized_title: analysis::normalize::comparison_key(title),
            duration_seconds: None,
            bitrate: None,
            last_seen: now_secs(),
            modified: 0,
        }
    }

    fn complete_album(artist: &str, album: &str) -> Vec<TrackRecord> {
        (1..=5)
            .map(|n| {
                track(
                    &format!("old/{} {:02}.mp3", album, n),
                    artist,
                    album,
                    &format!("Song {}", n),
                    Some(n),
                )
            })
            .collect()
    }

    fn plan_for(records: &[TrackRecord], options: &PlanOptions) -> Plan {
        let config = NormalizeConfig::default();
        let verdicts = classify_all(records, 5);
        let mixed = duplicates_in_mixed(records, &verdicts);
        build_plan(records, &verdicts, &mixed, &config, options).unwrap()
    }

    #[test]
    fn complete_album_moves_into_artist_album_folder() {
        let records = complete_album("Neil Young", "Harvest");
        let plan = plan_for(&records, &PlanOptions::default());
        assert_eq!(plan.operations.len(), 5);
        assert_eq!(
            plan.operations[0].destination,
            "Neil Young - Harvest/Neil Young - Song 1.mp3"
        );
        assert!(plan
            .operations
            .iter()
            .all(|op| op.kind == OperationKind::Move));
    }

    #[test]
    fn partial_album_folder_carries_partial_suffix() {
        let mut records = complete_album("Neil Young", "Harvest");
        // Renumber to create a gap: {1,2,4,5,6}.
        records[2].raw_track_number = Some(4);
        records[3].raw_track_number = Some(5);
        records[4].raw_track_number = Some(6);
        let plan = plan_for(&records, &PlanOptions::default());
        assert!(plan
            .operations
            .iter()
            .all(|op| op.destination.starts_with("Neil Young - Harvest (partial)/")));
    }

    #[test]
    fn incomplete_albums_consolidate_into_mixed() {
        let records = vec![
            track("loose/a.mp3", "Neil Young", "Some Album", "One", Some(1)),
            track("loose/b.mp3", "Neil Young", "Some Album", "Two", Some(2)),
        ];
        let plan = plan_for(&records, &PlanOptions::default());
        assert_eq!(plan.operations.len(), 2);
        assert!(plan
            .operations
            .iter()
            .all(|op| op.destination.starts_with("Neil Young - Mixed/")));
    }

    #[test]
    fn colliding_destinations_get_ascending_suffixes_by_source_path() {
        let records = vec![
            track("b/Song.mp3", "Artist", "Unknown", "Song", None),
            track("a/Song.mp3", "Artist", "Unknown", "Song", None),
        ];
        let plan = plan_for(&records, &PlanOptions::default());
        assert_eq!(plan.operations.len(), 2);
        // a/ sorts first and wins the unsuffixed name.
        assert_eq!(plan.operations[0].source, "a/Song.mp3");
        assert_eq!(
            plan.operations[0].destination,
            "Artist - Mixed/Artist - Song.mp3"
        );
        assert_eq!(plan.operations[1].source, "b/Song.mp3");
        assert_eq!(
            plan.operations[1].destination,
            "Artist - Mixed/Artist - Song (1).mp3"
        );
    }

    #[test]
    fn planning_is_deterministic_and_idempotent() {
        let mut records = complete_album("greatful dead", "Europe 72");
        records.push(track("x/y.mp3", "Artist", "Unknown", "Thing", None));
        let first = plan_for(&records, &PlanOptions::default());
        let second = plan_for(&records, &PlanOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn corrected_artist_spelling_names_the_folder() {
        let records = complete_album("greatful dead", "American Beauty");
        let plan = plan_for(&records, &PlanOptions::default());
        assert!(plan.operations[0]
            .destination
            .starts_with("Grateful Dead - American Beauty/"));
    }

    #[test]
    fn correction_whose_key_differs_from_its_target_still_fires() {
        let mut config = NormalizeConfig::default();
        config
            .artist_corrections
            .insert("beetles".to_string(), "The Beatles".to_string());

        // Scan-time keys come from the corrected name, so the group key is
        // "beatles" while the correction stays keyed by the misspelling.
        let mut record = track("x/raw.mp3", "beetles", "Unknown", "Something", None);
        record.normalized_artist =
            analysis::normalize::comparison_key(&config.canonical_artist("beetles"));
        assert_eq!(record.normalized_artist, "beatles");

        let records = vec![record];
        let verdicts = classify_all(&records, 5);
        let plan = build_plan(&records, &verdicts, &[], &config, &PlanOptions::default()).unwrap();
        assert_eq!(
            plan.operations[0].destination,
            "Beatles - Mixed/Beatles - Something.mp3"
        );
    }

    #[test]
    fn the_prefix_is_dropped_in_folder_names_by_default() {
        let records = complete_album("The Velvet Underground", "Loaded");
        let plan = plan_for(&records, &PlanOptions::default());
        assert!(plan.operations[0]
            .destination
            .starts_with("Velvet Underground - Loaded/"));
    }

    #[test]
    fn mixed_duplicate_of_complete_album_goes_to_quarantine() {
        let mut records = complete_album("Artist", "Best Of");
        records.push(track(
            "loose/Song 3.mp3",
            "Artist",
            "Unknown",
            "Song 3",
            None,
        ));
        let plan = plan_for(&records, &PlanOptions::default());
        let quarantine: Vec<_> = plan
            .operations
            .iter()
            .filter(|op| op.kind == OperationKind::RemoveToQuarantine)
            .collect();
        assert_eq!(quarantine.len(), 1);
        assert_eq!(quarantine[0].source, "loose/Song 3.mp3");
        assert!(quarantine[0]
            .destination
            .starts_with(&format!("{}/", QUARANTINE_DIR)));
        // Quarantined files must not also be moved.
        assert!(!plan
            .operations
            .iter()
            .any(|op| op.kind != OperationKind::RemoveToQuarantine
                && op.source == "loose/Song 3.mp3"));
    }

    #[test]
    fn no_destination_collides_with_a_pending_source() {
        let mut records = complete_album("Artist", "Best Of");
        // A file already sitting at a path another record wants.
        records.push(track(
            "Artist - Best Of/Artist - Song 1.mp3",
            "Artist",
            "Unknown",
            "Other",
            None,
        ));
        let plan = plan_for(&records, &PlanOptions::default());
        for (index, op) in plan.operations.iter().enumerate() {
            for pending in &plan.operations[index + 1..] {
                assert_ne!(
                    op.destination, pending.source,
                    "destination {} collides with pending source",
                    op.destination
                );
            }
        }
    }

    #[test]
    fn partial_only_plans_touch_only_partial_albums() {
        let mut records = complete_album("Artist", "Whole");
        let mut gapped = complete_album("Artist", "Gappy");
        gapped[4].raw_track_number = Some(7);
        records.extend(gapped);
        let plan = plan_for(
            &records,
            &PlanOptions {
                partial_only: true,
                quarantine_duplicates: false,
                ..PlanOptions::default()
            },
        );
        assert!(!plan.operations.is_empty());
        assert!(plan
            .operations
            .iter()
            .all(|op| op.destination.contains("(partial)")));
    }

    #[test]
    fn unsafe_characters_are_stripped_from_components() {
        let records = vec![track(
            "x/raw.mp3",
            "AC/DC",
            "Unknown",
            "Back? In: Black*",
            None,
        )];
        let plan = plan_for(&records, &PlanOptions::default());
        // "AC/DC" normalizes with the slash removed.
        assert_eq!(
            plan.operations[0].destination,
            "ACDC - Mixed/ACDC - Back In Black.mp3"
        );
    }
}
