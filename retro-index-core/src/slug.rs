//! Slug normalization for fuzzy title matching.
//!
//! A slug is the lowercase, punctuation-free concatenation of a title's
//! words. Bracketed tags like `(USA)` or `[!]` are dropped, `&` reads as
//! "and", and a leading "the" is ignored. TV titles additionally normalize
//! episode markers (`1x05`, `S1E5`) to `s01e05`.

use crate::system::MediaType;

/// Slugify free text for the given media type.
pub fn slugify(media_type: MediaType, text: &str) -> String {
    slug_words(media_type, text).concat()
}

/// Slugify the file name of a path, ignoring directories and extension.
pub fn slugify_path(path: &str) -> String {
    slugify(MediaType::Game, &filename_from_path(path))
}

/// File name of a path without its extension.
pub fn filename_from_path(path: &str) -> String {
    let name = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.to_string(),
    }
}

/// Precomputed slug columns for a `MediaTitles` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugMetadata {
    pub slug: String,
    pub secondary_slug: Option<String>,
    pub slug_length: i64,
    pub slug_word_count: i64,
}

/// Compute slug, secondary slug (the subtitle after `: ` or ` - `), and the
/// length/word-count prefilter values for a title name.
pub fn slug_metadata(media_type: MediaType, name: &str) -> SlugMetadata {
    let words = slug_words(media_type, name);
    let slug = words.concat();

    let secondary_slug = [": ", " - "]
        .iter()
        .filter_map(|sep| name.split_once(sep).map(|(_, rest)| rest))
        .next()
        .map(|rest| slugify(media_type, rest))
        .filter(|s| !s.is_empty() && *s != slug);

    SlugMetadata {
        slug_length: slug.chars().count() as i64,
        slug_word_count: words.len() as i64,
        slug,
        secondary_slug,
    }
}

/// True when every alphabetic character is within the Latin script blocks.
///
/// Searches containing other scripts fall back to matching title names,
/// since their slugs may not survive normalization intact.
pub fn is_latin(text: &str) -> bool {
    text.chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| (c as u32) <= 0x024F)
}

fn slug_words(media_type: MediaType, text: &str) -> Vec<String> {
    let stripped = strip_brackets(text);
    let source = if stripped.trim().is_empty() {
        text.to_string()
    } else {
        stripped
    };
    let lowered = source.to_lowercase().replace('&', " and ");

    let mut words: Vec<String> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }

    if media_type == MediaType::TvShow {
        words = words
            .into_iter()
            .map(|w| normalize_episode(&w).unwrap_or(w))
            .collect();
    }

    words
}

fn strip_brackets(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn normalize_episode(word: &str) -> Option<String> {
    let (season, episode) = match word.split_once('x') {
        Some(parts) => parts,
        None => word.strip_prefix('s')?.split_once('e')?,
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(season) || !all_digits(episode) {
        return None;
    }
    let season: u32 = season.parse().ok()?;
    let episode: u32 = episode.parse().ok()?;
    Some(format!("s{season:02}e{episode:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_tags() {
        assert_eq!(
            slugify(MediaType::Game, "Super Mario Bros. (USA) [!]"),
            "supermariobros"
        );
        assert_eq!(slugify(MediaType::Game, "Sonic & Knuckles"), "sonicandknuckles");
        assert_eq!(slugify(MediaType::Game, "The Legend of Zelda"), "legendofzelda");
    }

    #[test]
    fn keeps_bracket_only_text() {
        assert_eq!(slugify(MediaType::Game, "(Unl)"), "unl");
    }

    #[test]
    fn tv_episode_markers() {
        assert_eq!(slugify(MediaType::TvShow, "Lost S01E05"), "losts01e05");
        assert_eq!(slugify(MediaType::TvShow, "Lost 1x5"), "losts01e05");
        assert_eq!(slugify(MediaType::Game, "Lost 1x5"), "lost1x5");
    }

    #[test]
    fn path_slug_uses_file_stem() {
        assert_eq!(slugify_path("/roms/nes/Super Mario Bros (USA).nes"), "supermariobros");
        assert_eq!(filename_from_path("C:\\games\\Doom.zip"), "Doom");
        assert_eq!(filename_from_path(".hidden"), ".hidden");
    }

    #[test]
    fn metadata_counts_and_secondary() {
        let meta = slug_metadata(MediaType::Game, "Zelda II: The Adventure of Link");
        assert_eq!(meta.slug, "zeldaiitheadventureoflink");
        assert_eq!(meta.secondary_slug.as_deref(), Some("adventureoflink"));
        assert_eq!(meta.slug_word_count, 6);
        assert_eq!(meta.slug_length, meta.slug.len() as i64);

        let plain = slug_metadata(MediaType::Game, "Tetris");
        assert_eq!(plain.secondary_slug, None);
    }

    #[test]
    fn latin_detection() {
        assert!(is_latin("Pokémon"));
        assert!(!is_latin("ドラゴンクエスト"));
        assert!(is_latin("1942"));
    }
}
