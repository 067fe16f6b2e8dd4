use std::collections::{BTreeMap, BTreeSet};

use common::{CompletenessVerdict, DuplicateKind, DuplicateSet, TrackRecord};

use crate::completeness::AlbumKey;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuplicateReport {
    pub exact: Vec<DuplicateSet>,
    pub potential: Vec<DuplicateSet>,
}

/// A track in a Mixed-bound group that also exists, by the potential rule,
/// inside an album classified Complete. The album copy is authoritative.
#[derive(Clone, Debug, PartialEq)]
pub struct MixedDuplicate {
    pub mixed_path: String,
    pub album_paths: Vec<String>,
}

/// Finds exact (hash-identical) and potential (same normalized artist+title,
/// different bytes) duplicate sets. Output order is deterministic: sets and
/// their members sort by path.
pub fn find_duplicates(records: &[TrackRecord]) -> DuplicateReport {
    let mut by_hash: BTreeMap<&str, Vec<&TrackRecord>> = BTreeMap::new();
    for record in records {
        if let Some(hash) = record.content_hash.as_deref() {
            by_hash.entry(hash).or_default().push(record);
        }
    }

    let mut exact = Vec::new();
    for members in by_hash.values() {
        if members.len() < 2 {
            continue;
        }
        let mut paths: Vec<String> = members.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        exact.push(DuplicateSet {
            kind: DuplicateKind::Exact,
            paths,
        });
    }
    exact.sort_by(|a, b| a.paths.cmp(&b.paths));

    let mut by_name: BTreeMap<(&str, &str), Vec<&TrackRecord>> = BTreeMap::new();
    for record in records {
        if record.normalized_artist.is_empty() || record.normalized_title.is_empty() {
            continue;
        }
        by_name
            .entry((&record.normalized_artist, &record.normalized_title))
            .or_default()
            .push(record);
    }

    let mut potential = Vec::new();
    for members in by_name.values() {
        if members.len() < 2 {
            continue;
        }
        // All members byte-identical means the group is already reported
        // as exact.
        let hashes: BTreeSet<&str> = members
            .iter()
            .filter_map(|r| r.content_hash.as_deref())
            .collect();
        if hashes.len() == 1 && members.iter().all(|r| r.content_hash.is_some()) {
            continue;
        }
        let mut paths: Vec<String> = members.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        potential.push(DuplicateSet {
            kind: DuplicateKind::Potential,
            paths,
        });
    }
    potential.sort_by(|a, b| a.paths.cmp(&b.paths));

    DuplicateReport { exact, potential }
}

/// Cross-mode refinement used by reorganization: tracks headed for a Mixed
/// folder whose normalized artist+title also appears in a Complete album.
/// These are safe to quarantine; the complete-album copy stays.
pub fn duplicates_in_mixed(
    records: &[TrackRecord],
    verdicts: &BTreeMap<AlbumKey, CompletenessVerdict>,
) -> Vec<MixedDuplicate> {
    let verdict_of = |record: &TrackRecord| {
        verdicts
            .get(&(
                record.normalized_artist.clone(),
                record.normalized_album.clone(),
            ))
            .copied()
            .unwrap_or(CompletenessVerdict::Unknown)
    };

    let mut complete_copies: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for record in records {
        if verdict_of(record) != CompletenessVerdict::Complete {
            continue;
        }
        if record.normalized_artist.is_empty() || record.normalized_title.is_empty() {
            continue;
        }
        complete_copies
            .entry((&record.normalized_artist, &record.normalized_title))
            .or_default()
            .push(&record.path);
    }

    let mut out = Vec::new();
    for record in records {
        let verdict = verdict_of(record);
        let headed_for_mixed = matches!(
            verdict,
            CompletenessVerdict::Incomplete | CompletenessVerdict::Unknown
        );
        if !headed_for_mixed {
            continue;
        }
        if record.normalized_artist.is_empty() || record.normalized_title.is_empty() {
            continue;
        }
        if let Some(copies) =
            complete_copies.get(&(record.normalized_artist.as_str(), record.normalized_title.as_str()))
        {
            let mut album_paths: Vec<String> = copies.iter().map(|p| p.to_string()).collect();
            album_paths.sort();
            out.push(MixedDuplicate {
                mixed_path: record.path.clone(),
                album_paths,
            });
        }
    }
    out.sort_by(|a, b| a.mixed_path.cmp(&b.mixed_path));
    out
}
