use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Characters stripped from any string destined for a path component.
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const MAX_COMPONENT_LEN: usize = 100;

/// Data-driven normalization rules. Lives in the user config so spelling
/// fixes never require a rebuild.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Known-wrong spelling (comparison key) -> preferred surface form.
    pub artist_corrections: BTreeMap<String, String>,
    /// Words left lowercase when title-casing, unless they start the name.
    pub casing_exceptions: Vec<String>,
    /// When false (the default), a leading "The " is dropped from artist
    /// names used in folder names. Either way both surface forms share one
    /// comparison key.
    pub prefer_the_prefix: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        let mut artist_corrections = BTreeMap::new();
        artist_corrections.insert("greatful dead".to_string(), "Grateful Dead".to_string());
        artist_corrections.insert("grateful dead".to_string(), "Grateful Dead".to_string());
        artist_corrections.insert("moody blues".to_string(), "The Moody Blues".to_string());
        artist_corrections.insert(
            "velvet underground".to_string(),
            "The Velvet Underground".to_string(),
        );
        artist_corrections.insert("marty robins".to_string(), "Marty Robbins".to_string());
        Self {
            artist_corrections,
            casing_exceptions: [
                "a", "an", "and", "at", "for", "in", "of", "on", "or", "the", "to",
            ]
            .iter()
            .map(|word| word.to_string())
            .collect(),
            prefer_the_prefix: false,
        }
    }
}

/// Output of one normalization pass over a single file's tags and path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedFields {
    pub parsed_artist: String,
    pub parsed_album: String,
    pub parsed_title: String,
    pub normalized_artist: String,
    pub normalized_album: String,
    pub normalized_title: String,
}

impl NormalizeConfig {
    /// Derives parsed fallbacks and comparison keys for one file.
    ///
    /// `folder_name` is the immediate parent folder ("Artist - Album"),
    /// `file_stem` the file name without extension ("Artist - Title").
    pub fn normalize(
        &self,
        raw_artist: Option<&str>,
        raw_album: Option<&str>,
        raw_title: Option<&str>,
        folder_name: &str,
        file_stem: &str,
    ) -> NormalizedFields {
        let (folder_artist, folder_album) = parse_folder_name(folder_name);
        let (file_artist, file_title) = parse_file_name(file_stem);

        let parsed_artist = if !is_placeholder(&folder_artist) {
            folder_artist
        } else {
            file_artist
        };
        let parsed_album = folder_album;
        let parsed_title = file_title;

        let artist = effective(raw_artist, &parsed_artist);
        let album = effective(raw_album, &parsed_album);
        let title = effective(raw_title, &parsed_title);

        NormalizedFields {
            normalized_artist: comparison_key(&self.canonical_artist(artist)),
            normalized_album: comparison_key(album),
            normalized_title: comparison_key(title),
            parsed_artist,
            parsed_album,
            parsed_title,
        }
    }

    /// Preferred surface form for an artist name: the corrections table wins,
    /// otherwise the name is title-cased.
    pub fn canonical_artist(&self, raw: &str) -> String {
        let key = comparison_key(raw);
        if let Some(preferred) = self.artist_corrections.get(&key) {
            return preferred.clone();
        }
        title_case(raw, &self.casing_exceptions)
    }

    /// Artist surface form used when building folder names.
    pub fn folder_artist(&self, canonical: &str) -> String {
        if self.prefer_the_prefix {
            return canonical.to_string();
        }
        match strip_the_prefix(canonical) {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => canonical.to_string(),
        }
    }
}

/// True for empty strings and the literal placeholder "Unknown".
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown")
}

fn effective<'a>(raw: Option<&'a str>, parsed: &'a str) -> &'a str {
    match raw {
        Some(value) if !is_placeholder(value) => value,
        _ => parsed,
    }
}

/// Comparison key: lowercase, leading "the " dropped, punctuation removed,
/// whitespace collapsed. Never shown to the user.
pub fn comparison_key(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let stripped = strip_the_prefix(&lower).unwrap_or(&lower);

    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for ch in stripped.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else if ch.is_whitespace() {
            pending_space = true;
        }
    }
    out
}

fn strip_the_prefix(value: &str) -> Option<&str> {
    let rest = value
        .strip_prefix("The ")
        .or_else(|| value.strip_prefix("the "))
        .or_else(|| value.strip_prefix("THE "))?;
    Some(rest.trim_start())
}

/// "Artist - Album" folder convention; a folder without the separator is
/// all artist, album unknown.
pub fn parse_folder_name(name: &str) -> (String, String) {
    match name.split_once(" - ") {
        Some((artist, album)) => (artist.trim().to_string(), album.trim().to_string()),
        None => (name.trim().to_string(), "Unknown".to_string()),
    }
}

/// "Artist - Title" file convention; a bare name is all title.
pub fn parse_file_name(stem: &str) -> (String, String) {
    match stem.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => ("Unknown".to_string(), stem.trim().to_string()),
    }
}

pub fn title_case(value: &str, exceptions: &[String]) -> String {
    let mut out = String::with_capacity(value.len());
    for (index, word) in value.split_whitespace().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let lower = word.to_lowercase();
        if index > 0 && exceptions.iter().any(|ex| ex == &lower) {
            out.push_str(&lower);
        } else if word.chars().all(|ch| ch.is_uppercase() || !ch.is_alphabetic())
            && word.chars().filter(|ch| ch.is_alphabetic()).count() > 1
            && word.len() <= 4
        {
            // Keep short all-caps words (CCR, ELO) as written.
            out.push_str(word);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Cleans a string for use as a path component: unsafe characters stripped,
/// whitespace collapsed, trailing dots trimmed, length capped.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for ch in value.chars() {
        if UNSAFE_CHARS.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }

    let mut out = out.trim_matches(|ch| ch == ' ' || ch == '.').to_string();
    if out.chars().count() > MAX_COMPONENT_LEN {
        let capped: String = out.chars().take(MAX_COMPONENT_LEN).collect();
        out = match capped.rsplit_once(' ') {
            Some((head, _)) => head.to_string(),
            None => capped,
        };
    }

    if out.is_empty() {
        "Unknown".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_key_folds_case_the_and_punctuation() {
        assert_eq!(comparison_key("The Moody Blues"), "moody blues");
        assert_eq!(comparison_key("moody  blues"), "moody blues");
        assert_eq!(comparison_key("Truckin'"), "truckin");
        assert_eq!(comparison_key("  "), "");
    }

    #[test]
    fn corrections_rewrite_misspelled_artists() {
        let cfg = NormalizeConfig::default();
        assert_eq!(cfg.canonical_artist("greatful dead"), "Grateful Dead");
        assert_eq!(cfg.canonical_artist("GREATFUL DEAD"), "Grateful Dead");
        assert_eq!(cfg.canonical_artist("marty robins"), "Marty Robbins");
    }

    #[test]
    fn the_variants_share_one_key_but_folder_form_drops_the() {
        let cfg = NormalizeConfig::default();
        assert_eq!(
            comparison_key("The Velvet Underground"),
            comparison_key("Velvet Underground")
        );
        assert_eq!(
            cfg.folder_artist("The Velvet Underground"),
            "Velvet Underground"
        );

        let keep = NormalizeConfig {
            prefer_the_prefix: true,
            ..NormalizeConfig::default()
        };
        assert_eq!(
            keep.folder_artist("The Velvet Underground"),
            "The Velvet Underground"
        );
    }

    #[test]
    fn placeholder_tags_fall_back_to_path_parse() {
        let cfg = NormalizeConfig::default();
        let fields = cfg.normalize(
            Some("Unknown"),
            None,
            Some(""),
            "Neil Young - Harvest",
            "Neil Young - Heart of Gold",
        );
        assert_eq!(fields.parsed_artist, "Neil Young");
        assert_eq!(fields.parsed_album, "Harvest");
        assert_eq!(fields.parsed_title, "Heart of Gold");
        assert_eq!(fields.normalized_artist, "neil young");
        assert_eq!(fields.normalized_album, "harvest");
        assert_eq!(fields.normalized_title, "heart of gold");
    }

    #[test]
    fn tags_win_over_path_parse_when_present() {
        let cfg = NormalizeConfig::default();
        let fields = cfg.normalize(
            Some("greatful dead"),
            Some("American Beauty"),
            Some("Ripple"),
            "Misc",
            "track07",
        );
        assert_eq!(fields.normalized_artist, "grateful dead");
        assert_eq!(fields.normalized_album, "american beauty");
        assert_eq!(fields.normalized_title, "ripple");
        assert_eq!(fields.parsed_title, "track07");
    }

    #[test]
    fn sanitize_strips_unsafe_chars_and_caps_length() {
        assert_eq!(sanitize_component("AC/DC: Live?"), "ACDC Live");
        assert_eq!(sanitize_component("dots..."), "dots");
        assert_eq!(sanitize_component("<>:*"), "Unknown");
        let long = "word ".repeat(40);
        assert!(sanitize_component(&long).chars().count() <= 100);
    }

    #[test]
    fn title_case_respects_exception_words() {
        let cfg = NormalizeConfig::default();
        assert_eq!(
            title_case("dark side of the moon", &cfg.casing_exceptions),
            "Dark Side of the Moon"
        );
        assert_eq!(title_case("the beatles", &cfg.casing_exceptions), "The Beatles");
        assert_eq!(title_case("ELO live", &cfg.casing_exceptions), "ELO Live");
    }
}
