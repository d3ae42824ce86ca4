//! WHERE-clause construction shared by search, random selection and query
//! statistics.
//!
//! Every media filter goes through [`build_media_where`], so the system,
//! title, path and tag predicates mean the same thing at every call site.

use std::collections::HashSet;

use retro_index_core::{slugify, MediaQuery, MediaType, SystemDef, TagFilter, TagOperator};

use crate::sql::{escape_like, placeholders};
use crate::value::SqlValue;

/// A conjunction of SQL predicates and the parameters they bind, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    pub clauses: Vec<String>,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = SqlValue>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    /// A copy with one more predicate appended.
    pub fn and(&self, clause: impl Into<String>, param: SqlValue) -> Self {
        let mut out = self.clone();
        out.push(clause, [param]);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `WHERE a AND b ...`, or an empty string when there are no predicates.
    pub fn to_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Which title column the word predicates match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMatch {
    /// Slugified words against `Slug` and `SecondarySlug`.
    Slug,
    /// Raw words against `Name`, for scripts slugify cannot represent.
    Name,
}

// ── Variant groups ──────────────────────────────────────────────────────────

/// One group per search word, holding that word slugified once per distinct
/// media type among `systems`.
///
/// Systems sharing a media type produce the same variant, which is emitted
/// only once. Words that slugify to nothing are dropped.
pub fn variant_groups(systems: &[String], words: &[String]) -> Vec<Vec<String>> {
    let media_types: Vec<MediaType> = if systems.is_empty() {
        vec![MediaType::Game]
    } else {
        systems
            .iter()
            .map(|id| SystemDef::lookup(id).map_or(MediaType::Game, |s| s.media_type()))
            .collect()
    };

    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let mut groups = Vec::with_capacity(words.len());
    for (idx, word) in words.iter().enumerate() {
        let mut group = Vec::new();
        for media_type in &media_types {
            let variant = slugify(*media_type, word);
            if variant.is_empty() {
                continue;
            }
            if seen.insert((idx, variant.clone())) {
                group.push(variant);
            }
        }
        if !group.is_empty() {
            groups.push(group);
        }
    }
    groups
}

/// Groups for name matching: each non-blank word as-is.
pub fn raw_word_groups(words: &[String]) -> Vec<Vec<String>> {
    words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(|w| vec![w.to_string()])
        .collect()
}

fn push_variant_groups(clause: &mut WhereClause, groups: &[Vec<String>], mode: TitleMatch) {
    for group in groups {
        let mut alternatives = Vec::new();
        let mut params = Vec::new();
        for variant in group {
            match mode {
                TitleMatch::Slug => {
                    let pattern = format!("%{variant}%");
                    alternatives.push("MediaTitles.Slug LIKE ?".to_string());
                    alternatives.push("MediaTitles.SecondarySlug LIKE ?".to_string());
                    params.push(SqlValue::Text(pattern.clone()));
                    params.push(SqlValue::Text(pattern));
                }
                TitleMatch::Name => {
                    // Raw words may carry LIKE wildcards.
                    alternatives.push("MediaTitles.Name LIKE ? ESCAPE '\\'".to_string());
                    params.push(SqlValue::Text(format!("%{}%", escape_like(variant))));
                }
            }
        }
        clause.push(format!("({})", alternatives.join(" OR ")), params);
    }
}

// ── Tag filters ─────────────────────────────────────────────────────────────

const TAG_MATCH: &str = "TagTypes.Type = ? AND Tags.Tag = ?";

/// Predicates for a set of tag filters.
///
/// All AND filters collapse into one `IN (... INTERSECT ...)`, each NOT
/// becomes its own `NOT EXISTS`, and all OR filters share one `EXISTS`.
/// Parameters are `(type, value)` pairs in clause order.
pub fn tag_filter_sql(tags: &[TagFilter]) -> (Vec<String>, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    let by_op = |op: TagOperator| tags.iter().filter(move |t| t.operator == op);

    let ands: Vec<&TagFilter> = by_op(TagOperator::And).collect();
    if !ands.is_empty() {
        let selects: Vec<String> = ands
            .iter()
            .map(|_| {
                format!(
                    "SELECT MediaTags.MediaDBID FROM MediaTags \
                     INNER JOIN Tags ON Tags.DBID = MediaTags.TagDBID \
                     INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID \
                     WHERE {TAG_MATCH}"
                )
            })
            .collect();
        clauses.push(format!("Media.DBID IN ({})", selects.join(" INTERSECT ")));
        for tag in &ands {
            params.push(SqlValue::Text(tag.tag_type.clone()));
            params.push(SqlValue::Text(tag.value.clone()));
        }
    }

    for tag in by_op(TagOperator::Not) {
        clauses.push(format!(
            "NOT EXISTS (SELECT 1 FROM MediaTags \
             INNER JOIN Tags ON Tags.DBID = MediaTags.TagDBID \
             INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID \
             WHERE MediaTags.MediaDBID = Media.DBID AND {TAG_MATCH})"
        ));
        params.push(SqlValue::Text(tag.tag_type.clone()));
        params.push(SqlValue::Text(tag.value.clone()));
    }

    let ors: Vec<&TagFilter> = by_op(TagOperator::Or).collect();
    if !ors.is_empty() {
        let alternatives = vec![format!("({TAG_MATCH})"); ors.len()].join(" OR ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM MediaTags \
             INNER JOIN Tags ON Tags.DBID = MediaTags.TagDBID \
             INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID \
             WHERE MediaTags.MediaDBID = Media.DBID AND ({alternatives}))"
        ));
        for tag in &ors {
            params.push(SqlValue::Text(tag.tag_type.clone()));
            params.push(SqlValue::Text(tag.value.clone()));
        }
    }

    (clauses, params)
}

// ── Letter filter ───────────────────────────────────────────────────────────

const FIRST_CHAR: &str = "UPPER(SUBSTR(MediaTitles.Name, 1, 1))";

/// First-character filter on the title name: `0-9`, `#` (anything that is
/// neither a letter nor a digit) or a single letter. Other input is ignored.
pub fn push_letter_filter(clause: &mut WhereClause, letter: &str) {
    let letter = letter.trim().to_uppercase();
    match letter.as_str() {
        "" => {}
        "0-9" => clause.push(format!("{FIRST_CHAR} BETWEEN '0' AND '9'"), []),
        "#" => clause.push(
            format!("{FIRST_CHAR} NOT BETWEEN 'A' AND 'Z' AND {FIRST_CHAR} NOT BETWEEN '0' AND '9'"),
            [],
        ),
        l if l.len() == 1 && l.as_bytes()[0].is_ascii_uppercase() => {
            clause.push(format!("{FIRST_CHAR} = ?"), [SqlValue::Text(letter.clone())]);
        }
        _ => log::debug!("Ignoring unsupported letter filter '{}'", letter),
    }
}

// ── Shared builder ──────────────────────────────────────────────────────────

/// System, title-word, path-prefix and tag predicates over the
/// `Systems`/`MediaTitles`/`Media` join. Parameters bind in that order.
pub fn build_media_where(
    systems: &[String],
    groups: &[Vec<String>],
    mode: TitleMatch,
    path_prefix: &str,
    tags: &[TagFilter],
) -> WhereClause {
    let mut clause = WhereClause::new();

    if !systems.is_empty() {
        clause.push(
            format!("Systems.SystemID IN ({})", placeholders(systems.len())),
            systems.iter().map(|s| SqlValue::Text(s.clone())),
        );
    }

    push_variant_groups(&mut clause, groups, mode);

    if !path_prefix.is_empty() {
        clause.push(
            "Media.Path LIKE ? ESCAPE '\\'",
            [SqlValue::Text(format!("{}%", escape_like(path_prefix)))],
        );
    }

    let (tag_clauses, tag_params) = tag_filter_sql(tags);
    clause.clauses.extend(tag_clauses);
    clause.params.extend(tag_params);

    clause
}

/// Split a `*` glob into its non-empty literal parts.
pub fn glob_words(glob: &str) -> Vec<String> {
    glob.split('*')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Filter for a [`MediaQuery`], as used by random selection and statistics.
pub fn media_query_where(query: &MediaQuery) -> WhereClause {
    let groups = variant_groups(&query.systems, &glob_words(&query.path_glob));
    build_media_where(
        &query.systems,
        &groups,
        TitleMatch::Slug,
        &query.path_prefix,
        &query.tags,
    )
}
