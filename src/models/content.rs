use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::pagination::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Movie,
    Webseries,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Movie, ContentType::Webseries];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "MOVIE",
            ContentType::Webseries => "WEBSERIES",
        }
    }

    /// Path segment used by the public detail pages.
    pub fn url_segment(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Webseries => "webseries",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOVIE" | "MOVIES" => Ok(ContentType::Movie),
            "WEBSERIES" | "WEB-SERIES" | "SERIES" => Ok(ContentType::Webseries),
            other => Err(Error::validation(format!("unknown content type '{}'", other))),
        }
    }
}

impl ToSql for ContentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}

/// A catalogue entry. `links` is only populated by the lookups that attach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: i64,
    pub name: String,
    pub rating: f64,
    pub genre: String,
    pub plot_summary: String,
    pub poster_url: String,
    pub release_year: i32,
    pub duration: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub content_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLink {
    pub title: String,
    pub link: String,
}

/// Payload for `save`: no id inserts, an id replaces that row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentForm {
    pub id: Option<i64>,
    pub name: String,
    pub rating: f64,
    pub genre: String,
    pub plot_summary: String,
    pub poster_url: String,
    pub release_year: i32,
    pub duration: String,
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,
    pub links: Vec<NewLink>,
}

/// Partial update merged over an existing record (admin PUT).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentPatch {
    pub name: Option<String>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub plot_summary: Option<String>,
    pub poster_url: Option<String>,
    pub release_year: Option<i32>,
    pub duration: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,
}

impl ContentForm {
    pub fn validate(&self) -> Result<ContentType> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        self.content_type
            .ok_or_else(|| Error::validation("type is required"))
    }

    /// The row a store persists for this form under `id`.
    pub fn to_content(&self, id: i64) -> Result<Content> {
        let content_type = self.validate()?;
        Ok(Content {
            id,
            name: self.name.clone(),
            rating: self.rating,
            genre: self.genre.clone(),
            plot_summary: self.plot_summary.clone(),
            poster_url: self.poster_url.clone(),
            release_year: self.release_year,
            duration: self.duration.clone(),
            content_type,
            links: None,
        })
    }
}

impl From<&Content> for ContentForm {
    fn from(c: &Content) -> Self {
        ContentForm {
            id: Some(c.id),
            name: c.name.clone(),
            rating: c.rating,
            genre: c.genre.clone(),
            plot_summary: c.plot_summary.clone(),
            poster_url: c.poster_url.clone(),
            release_year: c.release_year,
            duration: c.duration.clone(),
            content_type: Some(c.content_type),
            links: Vec::new(),
        }
    }
}

impl ContentPatch {
    pub fn merge_into(self, existing: &Content) -> ContentForm {
        let mut form = ContentForm::from(existing);
        if let Some(v) = self.name {
            form.name = v;
        }
        if let Some(v) = self.rating {
            form.rating = v;
        }
        if let Some(v) = self.genre {
            form.genre = v;
        }
        if let Some(v) = self.plot_summary {
            form.plot_summary = v;
        }
        if let Some(v) = self.poster_url {
            form.poster_url = v;
        }
        if let Some(v) = self.release_year {
            form.release_year = v;
        }
        if let Some(v) = self.duration {
            form.duration = v;
        }
        if let Some(v) = self.content_type {
            form.content_type = Some(v);
        }
        form
    }
}

impl Content {
    pub fn slug(&self) -> String {
        slug::slugify(&self.name)
    }

    pub fn detail_path(&self) -> String {
        format!("/{}/{}/{}", self.content_type.url_segment(), self.id, self.slug())
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Content {
            id: row.get("id")?,
            name: row.get("name")?,
            rating: row.get::<_, Option<f64>>("rating")?.unwrap_or_default(),
            genre: row.get::<_, Option<String>>("genre")?.unwrap_or_default(),
            plot_summary: row
                .get::<_, Option<String>>("plot_summary")?
                .unwrap_or_default(),
            poster_url: row
                .get::<_, Option<String>>("poster_url")?
                .unwrap_or_default(),
            release_year: row.get::<_, Option<i32>>("release_year")?.unwrap_or_default(),
            duration: row.get::<_, Option<String>>("duration")?.unwrap_or_default(),
            content_type: row.get("type")?,
            links: None,
        })
    }

    pub fn query(pool: &DbPool, q: &ContentQuery, page: Page) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let (clause, mut args) = q.where_clause();
        let sql = format!(
            "SELECT * FROM content{} ORDER BY id DESC LIMIT ? OFFSET ?",
            clause
        );
        args.push(Box::new(page.limit));
        args.push(Box::new(page.offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = args.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), Self::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn count(pool: &DbPool, q: &ContentQuery) -> Result<i64> {
        let conn = pool.get()?;
        let (clause, args) = q.where_clause();
        let sql = format!("SELECT COUNT(*) FROM content{}", clause);
        let params_refs: Vec<&dyn ToSql> = args.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?)
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<Self>> {
        let conn = pool.get()?;
        let found = conn
            .query_row("SELECT * FROM content WHERE id = ?1", params![id], Self::from_row)
            .optional()?;
        Ok(found)
    }

    pub fn create(pool: &DbPool, form: &ContentForm) -> Result<Self> {
        let draft = form.to_content(0)?;
        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO content (name, rating, genre, plot_summary, poster_url, release_year, duration, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                draft.name,
                draft.rating,
                draft.genre,
                draft.plot_summary,
                draft.poster_url,
                draft.release_year,
                draft.duration,
                draft.content_type,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for link in &form.links {
            tx.execute(
                "INSERT INTO links (title, link, content_id) VALUES (?1, ?2, ?3)",
                params![link.title, link.link, id],
            )?;
        }
        tx.commit()?;
        Ok(Content { id, ..draft })
    }

    pub fn replace(pool: &DbPool, id: i64, form: &ContentForm) -> Result<Self> {
        let updated = form.to_content(id)?;
        let conn = pool.get()?;
        let changed = conn.execute(
            "UPDATE content SET name=?1, rating=?2, genre=?3, plot_summary=?4, poster_url=?5,
             release_year=?6, duration=?7, type=?8 WHERE id=?9",
            params![
                updated.name,
                updated.rating,
                updated.genre,
                updated.plot_summary,
                updated.poster_url,
                updated.release_year,
                updated.duration,
                updated.content_type,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("content {}", id)));
        }
        Ok(updated)
    }

    /// Removes the row and its links in one transaction.
    pub fn delete(pool: &DbPool, id: i64) -> Result<bool> {
        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM links WHERE content_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM content WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

impl Link {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Link {
            id: row.get("id")?,
            title: row.get::<_, Option<String>>("title")?.unwrap_or_default(),
            link: row.get::<_, Option<String>>("link")?.unwrap_or_default(),
            content_id: row.get("content_id")?,
        })
    }

    pub fn for_content(pool: &DbPool, content_id: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM links WHERE content_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![content_id], Self::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn create(pool: &DbPool, content_id: i64, link: &NewLink) -> Result<Self> {
        let conn = pool.get()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM content WHERE id = ?1",
            params![content_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(Error::not_found(format!("content {}", content_id)));
        }
        conn.execute(
            "INSERT INTO links (title, link, content_id) VALUES (?1, ?2, ?3)",
            params![link.title, link.link, content_id],
        )?;
        Ok(Link {
            id: conn.last_insert_rowid(),
            title: link.title.clone(),
            link: link.link.clone(),
            content_id,
        })
    }

    pub fn delete(pool: &DbPool, content_id: i64, link_id: i64) -> Result<bool> {
        let conn = pool.get()?;
        let removed = conn.execute(
            "DELETE FROM links WHERE id = ?1 AND content_id = ?2",
            params![link_id, content_id],
        )?;
        Ok(removed > 0)
    }
}

/// Filter shared by every list and count operation.
///
/// `keyword` matches a case-insensitive substring of `name`, `genre` a
/// case-insensitive substring of the free-text genre field. An empty
/// keyword or genre matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentQuery {
    pub content_type: Option<ContentType>,
    pub keyword: Option<String>,
    pub genre: Option<String>,
}

impl ContentQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(content_type: ContentType) -> Self {
        ContentQuery {
            content_type: Some(content_type),
            ..Self::default()
        }
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.keyword = Some(keyword.to_string());
        self
    }

    pub fn with_genre(mut self, genre: &str) -> Self {
        self.genre = Some(genre.to_string());
        self
    }

    pub fn matches(&self, c: &Content) -> bool {
        if let Some(t) = self.content_type {
            if c.content_type != t {
                return false;
            }
        }
        if let Some(kw) = &self.keyword {
            if !contains_ci(&c.name, kw) {
                return false;
            }
        }
        if let Some(g) = &self.genre {
            if !contains_ci(&c.genre, g) {
                return false;
            }
        }
        true
    }

    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conds: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(t) = self.content_type {
            conds.push("type = ?");
            args.push(Box::new(t));
        }
        if let Some(kw) = &self.keyword {
            conds.push("LOWER(name) LIKE ? ESCAPE '\\'");
            args.push(Box::new(like_pattern(kw)));
        }
        if let Some(g) = &self.genre {
            conds.push("LOWER(COALESCE(genre, '')) LIKE ? ESCAPE '\\'");
            args.push(Box::new(like_pattern(g)));
        }

        if conds.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", conds.join(" AND ")), args)
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// `%needle%` with LIKE metacharacters escaped so both backends match literally.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.to_ascii_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, genre: &str, t: ContentType) -> Content {
        Content {
            id: 1,
            name: name.to_string(),
            rating: 7.5,
            genre: genre.to_string(),
            plot_summary: String::new(),
            poster_url: String::new(),
            release_year: 2020,
            duration: "2h".to_string(),
            content_type: t,
            links: None,
        }
    }

    #[test]
    fn type_parsing() {
        assert_eq!("movie".parse::<ContentType>().unwrap(), ContentType::Movie);
        assert_eq!("WEBSERIES".parse::<ContentType>().unwrap(), ContentType::Webseries);
        assert!("anime".parse::<ContentType>().is_err());
    }

    #[test]
    fn type_json_shape() {
        let c = sample("Dune", "Sci-Fi", ContentType::Movie);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "MOVIE");
        assert_eq!(v["plotSummary"], "");
        assert_eq!(v["releaseYear"], 2020);
        assert!(v.get("links").is_none());
    }

    #[test]
    fn keyword_is_case_insensitive_substring() {
        let c = sample("The Dark Knight", "Action", ContentType::Movie);
        assert!(ContentQuery::all().with_keyword("dark").matches(&c));
        assert!(ContentQuery::all().with_keyword("KNIGHT").matches(&c));
        assert!(ContentQuery::all().with_keyword("").matches(&c));
        assert!(!ContentQuery::all().with_keyword("batman").matches(&c));
    }

    #[test]
    fn genre_is_substring_not_tag() {
        let c = sample("Arrival", "Drama, Sci-Fi", ContentType::Movie);
        assert!(ContentQuery::all().with_genre("sci").matches(&c));
        assert!(ContentQuery::all().with_genre("SCI-FI").matches(&c));
        assert!(!ContentQuery::all().with_genre("horror").matches(&c));
    }

    #[test]
    fn type_filter_combines() {
        let c = sample("Dark", "Thriller", ContentType::Webseries);
        assert!(ContentQuery::of_type(ContentType::Webseries)
            .with_keyword("dar")
            .matches(&c));
        assert!(!ContentQuery::of_type(ContentType::Movie)
            .with_keyword("dar")
            .matches(&c));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_Off"), "%50\\%\\_off%");
    }

    #[test]
    fn patch_merges_over_existing() {
        let existing = sample("Old", "Drama", ContentType::Movie);
        let patch = ContentPatch {
            name: Some("New".into()),
            rating: Some(9.0),
            ..Default::default()
        };
        let form = patch.merge_into(&existing);
        assert_eq!(form.id, Some(1));
        assert_eq!(form.name, "New");
        assert_eq!(form.rating, 9.0);
        assert_eq!(form.genre, "Drama");
        assert_eq!(form.content_type, Some(ContentType::Movie));
    }

    #[test]
    fn form_requires_name_and_type() {
        let mut form = ContentForm::default();
        assert!(form.validate().is_err());
        form.name = "X".into();
        assert!(form.validate().is_err());
        form.content_type = Some(ContentType::Movie);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn detail_path_uses_slug() {
        let mut c = sample("Money Heist: Part 2", "", ContentType::Webseries);
        c.id = 42;
        assert_eq!(c.detail_path(), "/webseries/42/money-heist-part-2");
    }
}
