use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::errors::Result;
use crate::models::analytics::{DailyCount, UrlCount, Visit};
use crate::models::content::{Content, ContentForm, ContentQuery, Link, NewLink};
use crate::pagination::Page;

use super::Store;

/// SQLite-backed implementation of the Store trait.
/// Wraps an r2d2 connection pool and delegates to model methods.
pub struct SqliteStore {
    pub pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn new_at(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::init_pool(path)?))
    }

    pub fn run_migrations(&self) -> Result<()> {
        crate::db::run_migrations(&self.pool)
    }
}

impl Store for SqliteStore {
    // ── Lifecycle ───────────────────────────────────────────────────

    fn backend_name(&self) -> &str {
        "sqlite"
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    // ── Content ─────────────────────────────────────────────────────

    fn content_query(&self, query: &ContentQuery, page: Page) -> Result<Vec<Content>> {
        Content::query(&self.pool, query, page)
    }

    fn content_count(&self, query: &ContentQuery) -> Result<i64> {
        Content::count(&self.pool, query)
    }

    fn content_get(&self, id: i64) -> Result<Option<Content>> {
        Content::find_by_id(&self.pool, id)
    }

    fn content_insert(&self, form: &ContentForm) -> Result<Content> {
        Content::create(&self.pool, form)
    }

    fn content_replace(&self, id: i64, form: &ContentForm) -> Result<Content> {
        Content::replace(&self.pool, id, form)
    }

    fn content_delete(&self, id: i64) -> Result<bool> {
        Content::delete(&self.pool, id)
    }

    // ── Links ───────────────────────────────────────────────────────

    fn links_for(&self, content_id: i64) -> Result<Vec<Link>> {
        Link::for_content(&self.pool, content_id)
    }

    fn link_insert(&self, content_id: i64, link: &NewLink) -> Result<Link> {
        Link::create(&self.pool, content_id, link)
    }

    fn link_delete(&self, content_id: i64, link_id: i64) -> Result<bool> {
        Link::delete(&self.pool, content_id, link_id)
    }

    // ── Visits ──────────────────────────────────────────────────────

    fn visit_insert(&self, visit: &Visit) -> Result<()> {
        Visit::insert(&self.pool, visit)
    }

    fn visit_count_since(&self, since: &DateTime<Utc>) -> Result<i64> {
        Visit::count_since(&self.pool, since)
    }

    fn visit_count_after(&self, after: &DateTime<Utc>) -> Result<i64> {
        Visit::count_after(&self.pool, after)
    }

    fn visit_top_urls(&self, limit: i64) -> Result<Vec<UrlCount>> {
        Visit::top_urls(&self.pool, limit)
    }

    fn visit_daily_counts(&self, from: &DateTime<Utc>) -> Result<Vec<DailyCount>> {
        Visit::daily_counts(&self.pool, from)
    }

    fn visit_delete_all(&self) -> Result<usize> {
        Visit::delete_all(&self.pool)
    }

    fn visit_prune_before(&self, before: &DateTime<Utc>) -> Result<usize> {
        Visit::prune_before(&self.pool, before)
    }
}
