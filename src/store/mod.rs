use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::DatabaseConfig;
use crate::errors::{Error, Result};
use crate::models::analytics::{DailyCount, UrlCount, Visit};
use crate::models::content::{Content, ContentForm, ContentQuery, ContentType, Link, NewLink};
use crate::pagination::Page;

pub mod flatfile;
pub mod sqlite;

/// Unified data-access trait. Every catalogue and visit operation goes through here.
/// Implementations: `SqliteStore` (rusqlite/r2d2) and `CsvStore` (flat files with an
/// in-memory snapshot).
///
/// Backends implement the primitives; the named catalogue operations are provided
/// on top of them so filtering, ordering and link attachment behave the same
/// whichever backend is selected.
pub trait Store: Send + Sync {
    // ── Lifecycle ───────────────────────────────────────────────────
    /// "sqlite" or "csv"
    fn backend_name(&self) -> &str;
    /// Drop any cached state and re-read from storage.
    fn refresh(&self) -> Result<()>;

    // ── Content primitives ──────────────────────────────────────────
    /// Matching rows ordered by id descending, then paged.
    fn content_query(&self, query: &ContentQuery, page: Page) -> Result<Vec<Content>>;
    fn content_count(&self, query: &ContentQuery) -> Result<i64>;
    /// Row only, without links.
    fn content_get(&self, id: i64) -> Result<Option<Content>>;
    /// Insert under a fresh id, together with `form.links`.
    fn content_insert(&self, form: &ContentForm) -> Result<Content>;
    /// Replace every field of row `id`. NotFound when the row is missing.
    fn content_replace(&self, id: i64, form: &ContentForm) -> Result<Content>;
    /// Remove the row and every link that references it.
    fn content_delete(&self, id: i64) -> Result<bool>;

    // ── Links ───────────────────────────────────────────────────────
    /// Ordered by link id ascending.
    fn links_for(&self, content_id: i64) -> Result<Vec<Link>>;
    /// NotFound when `content_id` does not exist.
    fn link_insert(&self, content_id: i64, link: &NewLink) -> Result<Link>;
    fn link_delete(&self, content_id: i64, link_id: i64) -> Result<bool>;

    // ── Visits ──────────────────────────────────────────────────────
    fn visit_insert(&self, visit: &Visit) -> Result<()>;
    /// `timestamp >= since`
    fn visit_count_since(&self, since: &DateTime<Utc>) -> Result<i64>;
    /// `timestamp > after`
    fn visit_count_after(&self, after: &DateTime<Utc>) -> Result<i64>;
    /// Grouped by page_url, count descending, ties by page_url ascending.
    fn visit_top_urls(&self, limit: i64) -> Result<Vec<UrlCount>>;
    /// UTC day buckets for `timestamp >= from`, oldest first, only days with visits.
    fn visit_daily_counts(&self, from: &DateTime<Utc>) -> Result<Vec<DailyCount>>;
    fn visit_delete_all(&self) -> Result<usize>;
    fn visit_prune_before(&self, before: &DateTime<Utc>) -> Result<usize>;

    // ── Catalogue queries ───────────────────────────────────────────

    fn list_all(&self, page: Page) -> Result<Vec<Content>> {
        self.content_query(&ContentQuery::all(), page)
    }

    fn list_by_type(&self, content_type: ContentType, page: Page) -> Result<Vec<Content>> {
        self.content_query(&ContentQuery::of_type(content_type), page)
    }

    fn search_by_keyword(&self, keyword: &str, page: Page) -> Result<Vec<Content>> {
        self.content_query(&ContentQuery::all().with_keyword(keyword), page)
    }

    fn search_by_type_and_keyword(
        &self,
        content_type: ContentType,
        keyword: &str,
        page: Page,
    ) -> Result<Vec<Content>> {
        let q = ContentQuery::of_type(content_type).with_keyword(keyword);
        self.content_query(&q, page)
    }

    fn list_by_genre(&self, genre: &str, page: Page) -> Result<Vec<Content>> {
        self.content_query(&ContentQuery::all().with_genre(genre), page)
    }

    fn list_by_genre_and_type(
        &self,
        genre: &str,
        content_type: ContentType,
        page: Page,
    ) -> Result<Vec<Content>> {
        let q = ContentQuery::of_type(content_type).with_genre(genre);
        self.content_query(&q, page)
    }

    fn count_by_type_and_keyword(&self, content_type: ContentType, keyword: &str) -> Result<i64> {
        self.content_count(&ContentQuery::of_type(content_type).with_keyword(keyword))
    }

    fn count_by_type(&self, content_type: ContentType) -> Result<i64> {
        self.content_count(&ContentQuery::of_type(content_type))
    }

    fn count_by_genre(&self, genre: &str) -> Result<i64> {
        self.content_count(&ContentQuery::all().with_genre(genre))
    }

    fn count_by_genre_and_type(&self, genre: &str, content_type: ContentType) -> Result<i64> {
        self.content_count(&ContentQuery::of_type(content_type).with_genre(genre))
    }

    /// Content with its links attached, or `None`.
    fn find_by_id(&self, id: i64) -> Result<Option<Content>> {
        let Some(mut content) = self.content_get(id)? else {
            return Ok(None);
        };
        content.links = Some(self.links_for(id)?);
        Ok(Some(content))
    }

    /// Like `find_by_id`, but `None` when the stored type differs.
    fn find_by_id_and_type(&self, id: i64, content_type: ContentType) -> Result<Option<Content>> {
        match self.content_get(id)? {
            Some(c) if c.content_type == content_type => self.find_by_id(id),
            _ => Ok(None),
        }
    }

    // ── Catalogue mutations ─────────────────────────────────────────

    /// Insert when `form.id` is empty, otherwise replace that row.
    /// Links in the form are only written on insert.
    fn save(&self, form: &ContentForm) -> Result<Content> {
        match form.id {
            None => self.content_insert(form),
            Some(id) => self.content_replace(id, form),
        }
    }

    /// Saves in input order and stops at the first failure. Rows saved before
    /// the failure stay saved.
    fn save_batch(&self, forms: &[ContentForm]) -> Result<Vec<Content>> {
        let mut saved = Vec::with_capacity(forms.len());
        for (idx, form) in forms.iter().enumerate() {
            match self.save(form) {
                Ok(c) => saved.push(c),
                Err(e) => {
                    log::error!(
                        "batch save stopped at item {} after {} saved: {}",
                        idx,
                        saved.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(saved)
    }

    fn delete_by_id(&self, id: i64) -> Result<bool> {
        self.content_delete(id)
    }

    fn add_link(&self, content_id: i64, link: &NewLink) -> Result<Link> {
        self.link_insert(content_id, link)
    }

    /// `false` when no link matched both ids.
    fn delete_link(&self, content_id: i64, link_id: i64) -> Result<bool> {
        self.link_delete(content_id, link_id)
    }
}

/// Build the backend named in the configuration.
pub fn open(cfg: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    match cfg.backend.as_str() {
        "sqlite" => {
            let store = sqlite::SqliteStore::new_at(&cfg.path)?;
            store.run_migrations()?;
            log::info!("Using SQLite store at {}", cfg.path);
            Ok(Arc::new(store))
        }
        "csv" => {
            let store = flatfile::CsvStore::open(&cfg.csv_dir)?;
            store.load()?;
            log::info!("Using CSV store in {}", cfg.csv_dir);
            Ok(Arc::new(store))
        }
        other => Err(Error::validation(format!(
            "unknown database backend '{}' (expected sqlite or csv)",
            other
        ))),
    }
}
