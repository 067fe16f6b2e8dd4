use std::collections::{BTreeMap, BTreeSet};

use common::{CompletenessVerdict, TrackRecord};

/// Album identity: (normalized_artist, normalized_album).
pub type AlbumKey = (String, String);

/// Groups live records into ephemeral album groups. Recomputed per pass,
/// never persisted.
pub fn group_albums(records: &[TrackRecord]) -> BTreeMap<AlbumKey, Vec<&TrackRecord>> {
    let mut groups: BTreeMap<AlbumKey, Vec<&TrackRecord>> = BTreeMap::new();
    for record in records {
        let key = (
            record.normalized_artist.clone(),
            record.normalized_album.clone(),
        );
        groups.entry(key).or_default().push(record);
    }
    for members in groups.values_mut() {
        members.sort_by(|a, b| a.path.cmp(&b.path));
    }
    groups
}

/// Classifies one album group by track count and track-number sequence.
///
/// A track with no number at all makes the verdict Unknown; guessing a
/// position would risk a false Complete or Partial label. Two tracks
/// claiming the same number is a duplicate signal, not a gap.
pub fn classify(tracks: &[&TrackRecord], min_tracks: usize) -> CompletenessVerdict {
    let album_is_unknown = tracks
        .first()
        .map(|t| {
            let album = t.normalized_album.as_str();
            album.is_empty() || album.contains("unknown")
        })
        .unwrap_or(true);

    if album_is_unknown || tracks.len() < min_tracks {
        return CompletenessVerdict::Incomplete;
    }

    let mut numbers = BTreeSet::new();
    for track in tracks {
        match track.raw_track_number {
            Some(number) => {
                numbers.insert(number);
            }
            None => return CompletenessVerdict::Unknown,
        }
    }

    let (min, max) = match (numbers.first(), numbers.last()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return CompletenessVerdict::Unknown,
    };

    if (max - min + 1) as usize == numbers.len() {
        CompletenessVerdict::Complete
    } else {
        CompletenessVerdict::Partial
    }
}

pub fn classify_all(
    records: &[TrackRecord],
    min_tracks: usize,
) -> BTreeMap<AlbumKey, CompletenessVerdict> {
    group_albums(records)
        .into_iter()
        .map(|(key, members)| {
            let verdict = classify(&members, min_tracks);
            (key, verdict)
        })
        .collect()
}
