//! Media search.
//!
//! Searches run in two phases: the media rows are selected first without
//! touching tags, then one follow-up query loads the tags for exactly the
//! returned ids and they are merged in memory.

use std::collections::HashMap;

use retro_index_core::{
    filename_from_path, is_latin, slugify, slugify_path, MediaQuery, MediaType, SearchFilters,
    SearchResult, SearchResultWithCursor, SystemDef, TagFilter, TagInfo,
};
use rusqlite::{params_from_iter, Connection, Row};

use crate::db::MediaDb;
use crate::error::{found, DbError};
use crate::filter::{
    build_media_where, glob_words, push_letter_filter, raw_word_groups, tag_filter_sql,
    variant_groups, TitleMatch, WhereClause,
};
use crate::random;
use crate::sql::placeholders;
use crate::value::SqlValue;

/// Row cap for unpaginated word searches.
pub const SEARCH_LIMIT: usize = 250;
/// Row cap for slug lookups.
pub const SLUG_SEARCH_LIMIT: usize = 50;
/// Page size used when a filtered search does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

const MEDIA_JOIN: &str = "FROM Systems
    INNER JOIN MediaTitles ON Systems.DBID = MediaTitles.SystemDBID
    INNER JOIN Media ON MediaTitles.DBID = Media.MediaTitleDBID";

fn row_to_cursor_result(row: &Row) -> rusqlite::Result<SearchResultWithCursor> {
    Ok(SearchResultWithCursor {
        system_id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        media_id: row.get(3)?,
        tags: Vec::new(),
        year: None,
    })
}

fn row_to_search_result(row: &Row) -> rusqlite::Result<SearchResult> {
    let path: String = row.get(1)?;
    Ok(SearchResult {
        system_id: row.get(0)?,
        name: filename_from_path(&path),
        path,
    })
}

fn query_cursor_results(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), row_to_cursor_result)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn media_type_of(system_id: &str) -> MediaType {
    SystemDef::lookup(system_id).map_or(MediaType::Game, |s| s.media_type())
}

// ── Tag attachment ──────────────────────────────────────────────────────────

/// Load the tags of every result in one query and merge them in by media id.
///
/// With `extract_year`, a `year` tag of exactly four digits also fills
/// `year`.
pub fn attach_tags(
    conn: &Connection,
    results: &mut [SearchResultWithCursor],
    extract_year: bool,
) -> Result<(), DbError> {
    if results.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = results.iter().map(|r| r.media_id).collect();
    let sql = format!(
        "SELECT MediaTags.MediaDBID, Tags.Tag, COALESCE(TagTypes.Type, '')
         FROM MediaTags
         INNER JOIN Tags ON MediaTags.TagDBID = Tags.DBID
         LEFT JOIN TagTypes ON Tags.TypeDBID = TagTypes.DBID
         WHERE MediaTags.MediaDBID IN ({})
         ORDER BY MediaTags.MediaDBID, TagTypes.Type, Tags.Tag",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            TagInfo {
                tag: row.get(1)?,
                tag_type: row.get(2)?,
            },
        ))
    })?;

    let mut by_media: HashMap<i64, Vec<TagInfo>> = HashMap::new();
    for row in rows {
        let (media_id, tag) = row?;
        by_media.entry(media_id).or_default().push(tag);
    }

    for result in results.iter_mut() {
        result.tags = by_media.remove(&result.media_id).unwrap_or_default();
        if extract_year {
            result.year = result
                .tags
                .iter()
                .find(|t| t.tag_type == "year" && t.tag.len() == 4 && t.tag.bytes().all(|b| b.is_ascii_digit()))
                .map(|t| t.tag.clone());
        }
    }
    Ok(())
}

// ── Path searches ───────────────────────────────────────────────────────────

/// Media whose path is exactly `path`, looked up through its path slug.
pub fn search_media_path_exact(
    conn: &Connection,
    systems: &[String],
    path: &str,
) -> Result<Vec<SearchResult>, DbError> {
    if systems.is_empty() {
        return Err(DbError::NoSystems("media search"));
    }

    let sql = format!(
        "SELECT Systems.SystemID, Media.Path {MEDIA_JOIN}
         WHERE Systems.SystemID IN ({})
         AND MediaTitles.Slug = ?
         AND Media.Path = ?
         LIMIT 1",
        placeholders(systems.len())
    );
    let mut params: Vec<SqlValue> = systems.iter().map(|s| SqlValue::Text(s.clone())).collect();
    params.push(SqlValue::Text(slugify_path(path)));
    params.push(SqlValue::Text(path.to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), row_to_search_result)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Word search over the given systems, first `SEARCH_LIMIT` matches by id.
pub fn search_media(
    conn: &Connection,
    systems: &[String],
    words: &[String],
) -> Result<Vec<SearchResult>, DbError> {
    if systems.is_empty() {
        return Err(DbError::NoSystems("media search"));
    }

    let groups = variant_groups(systems, words);
    let filter = build_media_where(systems, &groups, TitleMatch::Slug, "", &[]);
    let sql = format!(
        "SELECT Systems.SystemID, Media.Path {MEDIA_JOIN} {} ORDER BY Media.DBID LIMIT {SEARCH_LIMIT}",
        filter.to_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(filter.params.iter()), row_to_search_result)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Search by a `*` glob. An empty glob picks one random game instead.
pub fn search_media_path_glob(
    conn: &Connection,
    systems: &[String],
    glob: &str,
) -> Result<Vec<SearchResult>, DbError> {
    if systems.is_empty() {
        return Err(DbError::NoSystems("media search"));
    }

    let words = glob_words(glob);
    if !words.is_empty() {
        return search_media(conn, systems, &words);
    }

    let query = MediaQuery {
        systems: systems.to_vec(),
        ..Default::default()
    };
    match random::random_game_with_query_and_stats(conn, &query) {
        Ok((game, _)) => Ok(vec![game]),
        Err(DbError::NotFound) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

// ── Filtered search ─────────────────────────────────────────────────────────

/// The WHERE clause and bound parameters for a filtered search page,
/// excluding the trailing `LIMIT`.
pub fn filtered_search_where(filters: &SearchFilters, mode: TitleMatch) -> WhereClause {
    let words: Vec<String> = filters.query.split_whitespace().map(str::to_string).collect();
    let groups = match mode {
        TitleMatch::Slug => variant_groups(&filters.systems, &words),
        TitleMatch::Name => raw_word_groups(&words),
    };

    let mut filter = build_media_where(&filters.systems, &groups, mode, "", &filters.tags);
    if let Some(cursor) = filters.cursor {
        filter.push("Media.DBID > ?", [SqlValue::Integer(cursor)]);
    }
    if let Some(letter) = &filters.letter {
        push_letter_filter(&mut filter, letter);
    }
    filter
}

/// Full SQL and parameters of one filtered search page.
pub fn filtered_search_sql(filters: &SearchFilters, mode: TitleMatch) -> (String, Vec<SqlValue>) {
    let filter = filtered_search_where(filters, mode);
    let limit = if filters.limit == 0 { DEFAULT_PAGE_SIZE } else { filters.limit };
    let sql = format!(
        "SELECT Systems.SystemID, MediaTitles.Name, Media.Path, Media.DBID {MEDIA_JOIN} {} ORDER BY Media.DBID LIMIT ?",
        filter.to_sql()
    );
    let mut params = filter.params;
    params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    (sql, params)
}

/// One page of a cursor-paginated search, with tags and year attached.
///
/// Pass the last result's `media_id` as the next page's cursor. When a slug
/// search for non-Latin words finds nothing, the words are retried against
/// title names.
pub fn search_media_with_filters(
    conn: &Connection,
    filters: &SearchFilters,
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    if filters.systems.is_empty() {
        return Err(DbError::NoSystems("media search"));
    }

    let (sql, params) = filtered_search_sql(filters, TitleMatch::Slug);
    let mut results = query_cursor_results(conn, &sql, &params)?;

    if results.is_empty() && !filters.query.trim().is_empty() && !is_latin(&filters.query) {
        log::debug!("No slug matches for non-Latin query '{}', searching names", filters.query);
        let (sql, params) = filtered_search_sql(filters, TitleMatch::Name);
        results = query_cursor_results(conn, &sql, &params)?;
    }

    attach_tags(conn, &mut results, true)?;
    Ok(results)
}

// ── Slug lookups ────────────────────────────────────────────────────────────

fn slug_lookup(
    conn: &Connection,
    system_id: &str,
    title_clause: String,
    title_params: Vec<SqlValue>,
    tags: &[TagFilter],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let mut filter = WhereClause::new();
    filter.push("Systems.SystemID = ?", [SqlValue::Text(system_id.to_string())]);
    filter.push(title_clause, title_params);
    let (tag_clauses, tag_params) = tag_filter_sql(tags);
    filter.clauses.extend(tag_clauses);
    filter.params.extend(tag_params);

    let sql = format!(
        "SELECT DISTINCT Systems.SystemID, MediaTitles.Name, Media.Path, Media.DBID {MEDIA_JOIN} {}
         ORDER BY MediaTitles.Name
         LIMIT {SLUG_SEARCH_LIMIT}",
        filter.to_sql()
    );
    let mut results = query_cursor_results(conn, &sql, &filter.params)?;
    attach_tags(conn, &mut results, false)?;
    Ok(results)
}

/// Media whose title slug equals the slugified `slug`.
pub fn search_media_by_slug(
    conn: &Connection,
    system_id: &str,
    slug: &str,
    tags: &[TagFilter],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let slug = slugify(media_type_of(system_id), slug);
    slug_lookup(conn, system_id, "MediaTitles.Slug = ?".into(), vec![slug.into()], tags)
}

/// Media whose secondary (subtitle) slug equals the slugified `slug`.
pub fn search_media_by_secondary_slug(
    conn: &Connection,
    system_id: &str,
    slug: &str,
    tags: &[TagFilter],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let slug = slugify(media_type_of(system_id), slug);
    slug_lookup(
        conn,
        system_id,
        "MediaTitles.SecondarySlug = ?".into(),
        vec![slug.into()],
        tags,
    )
}

/// Media whose title slug starts with the slugified `prefix`.
pub fn search_media_by_slug_prefix(
    conn: &Connection,
    system_id: &str,
    prefix: &str,
    tags: &[TagFilter],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let prefix = slugify(media_type_of(system_id), prefix);
    slug_lookup(
        conn,
        system_id,
        "MediaTitles.Slug LIKE ?".into(),
        vec![format!("{prefix}%").into()],
        tags,
    )
}

/// Media whose title slug is any of `slugs`. Inputs that slugify to nothing
/// are skipped; an empty list matches nothing.
pub fn search_media_by_slug_in(
    conn: &Connection,
    system_id: &str,
    slugs: &[String],
    tags: &[TagFilter],
) -> Result<Vec<SearchResultWithCursor>, DbError> {
    let media_type = media_type_of(system_id);
    let slugified: Vec<SqlValue> = slugs
        .iter()
        .map(|s| slugify(media_type, s))
        .filter(|s| !s.is_empty())
        .map(SqlValue::Text)
        .collect();
    if slugified.is_empty() {
        return Ok(Vec::new());
    }
    let clause = format!("MediaTitles.Slug IN ({})", placeholders(slugified.len()));
    slug_lookup(conn, system_id, clause, slugified, tags)
}

/// A single media row by id, with tags.
pub fn get_media_by_dbid(conn: &Connection, media_dbid: i64) -> Result<SearchResultWithCursor, DbError> {
    let sql = format!(
        "SELECT Systems.SystemID, MediaTitles.Name, Media.Path, Media.DBID {MEDIA_JOIN} WHERE Media.DBID = ?1"
    );
    let result = found(conn.query_row(&sql, [media_dbid], row_to_cursor_result))?;
    let mut results = [result];
    attach_tags(conn, &mut results, true)?;
    let [result] = results;
    Ok(result)
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    pub fn search_media_path_exact(&self, systems: &[String], path: &str) -> Result<Vec<SearchResult>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_path_exact(&conn, systems, path)
    }

    pub fn search_media_path_glob(&self, systems: &[String], glob: &str) -> Result<Vec<SearchResult>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_path_glob(&conn, systems, glob)
    }

    pub fn search_media(&self, systems: &[String], words: &[String]) -> Result<Vec<SearchResult>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media(&conn, systems, words)
    }

    pub fn search_media_with_filters(&self, filters: &SearchFilters) -> Result<Vec<SearchResultWithCursor>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_with_filters(&conn, filters)
    }

    pub fn search_media_by_slug(
        &self,
        system_id: &str,
        slug: &str,
        tags: &[TagFilter],
    ) -> Result<Vec<SearchResultWithCursor>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_by_slug(&conn, system_id, slug, tags)
    }

    pub fn search_media_by_secondary_slug(
        &self,
        system_id: &str,
        slug: &str,
        tags: &[TagFilter],
    ) -> Result<Vec<SearchResultWithCursor>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_by_secondary_slug(&conn, system_id, slug, tags)
    }

    pub fn search_media_by_slug_prefix(
        &self,
        system_id: &str,
        prefix: &str,
        tags: &[TagFilter],
    ) -> Result<Vec<SearchResultWithCursor>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_by_slug_prefix(&conn, system_id, prefix, tags)
    }

    pub fn search_media_by_slug_in(
        &self,
        system_id: &str,
        slugs: &[String],
        tags: &[TagFilter],
    ) -> Result<Vec<SearchResultWithCursor>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        search_media_by_slug_in(&conn, system_id, slugs, tags)
    }

    pub fn get_media_by_dbid(&self, media_dbid: i64) -> Result<SearchResultWithCursor, DbError> {
        self.check()?;
        let conn = self.reader()?;
        get_media_by_dbid(&conn, media_dbid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_search_params_dedup_systems() {
        let filters = SearchFilters {
            systems: vec!["NES".into(), "SNES".into()],
            query: "mario".into(),
            limit: 10,
            ..Default::default()
        };
        let (sql, params) = filtered_search_sql(&filters, TitleMatch::Slug);
        assert_eq!(
            params,
            vec![
                SqlValue::Text("NES".into()),
                SqlValue::Text("SNES".into()),
                SqlValue::Text("%mario%".into()),
                SqlValue::Text("%mario%".into()),
                SqlValue::Integer(10),
            ]
        );
        assert!(sql.ends_with("ORDER BY Media.DBID LIMIT ?"));
    }

    #[test]
    fn cursor_and_letter_follow_tags() {
        let filters = SearchFilters {
            systems: vec!["NES".into()],
            query: String::new(),
            tags: vec!["region:usa".parse().unwrap()],
            letter: Some("s".into()),
            cursor: Some(42),
            limit: 0,
        };
        let (_, params) = filtered_search_sql(&filters, TitleMatch::Slug);
        assert_eq!(
            params,
            vec![
                SqlValue::Text("NES".into()),
                SqlValue::Text("region".into()),
                SqlValue::Text("usa".into()),
                SqlValue::Integer(42),
                SqlValue::Text("S".into()),
                SqlValue::Integer(DEFAULT_PAGE_SIZE as i64),
            ]
        );
    }

    #[test]
    fn name_mode_uses_raw_words() {
        let filters = SearchFilters {
            systems: vec!["NES".into()],
            query: "ドラゴン クエスト".into(),
            limit: 5,
            ..Default::default()
        };
        let filter = filtered_search_where(&filters, TitleMatch::Name);
        assert_eq!(filter.clauses[1], "(MediaTitles.Name LIKE ? ESCAPE '\\')");
        assert_eq!(filter.params[1], SqlValue::Text("%ドラゴン%".into()));
        assert_eq!(filter.params[2], SqlValue::Text("%クエスト%".into()));
    }

    #[test]
    fn name_mode_escapes_wildcards() {
        let filters = SearchFilters {
            systems: vec!["NES".into()],
            query: "100%_クエスト".into(),
            ..Default::default()
        };
        let filter = filtered_search_where(&filters, TitleMatch::Name);
        assert_eq!(filter.params[1], SqlValue::Text("%100\\%\\_クエスト%".into()));
    }

    #[test]
    fn oversized_limit_is_clamped() {
        let filters = SearchFilters {
            systems: vec!["NES".into()],
            limit: usize::MAX,
            ..Default::default()
        };
        let (_, params) = filtered_search_sql(&filters, TitleMatch::Slug);
        assert_eq!(params.last(), Some(&SqlValue::Integer(i64::MAX)));
    }
}
