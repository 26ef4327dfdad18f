use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::Result;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database at `path`.
/// Foreign keys are switched on for every pooled connection so link rows
/// follow their content on delete.
pub fn init_pool(path: &str) -> Result<DbPool> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let manager = SqliteConnectionManager::file(path)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(10).build(manager)?;

    // WAL for concurrent readers
    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    Ok(pool)
}

/// Pool over a named shared-cache in-memory database. Every connection in
/// the pool sees the same data; the database vanishes with the last one.
pub fn init_memory_pool(name: &str) -> Result<DbPool> {
    let uri = format!("file:{}?mode=memory&cache=shared", name);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    Ok(Pool::builder().max_size(4).build(manager)?)
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Catalogue entries
        CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            rating REAL,
            genre TEXT,
            plot_summary TEXT,
            poster_url TEXT,
            release_year INTEGER,
            duration TEXT,
            type TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_content_type ON content(type);

        -- Download / stream links, owned by one content row
        CREATE TABLE IF NOT EXISTS links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            link TEXT,
            content_id INTEGER NOT NULL,
            FOREIGN KEY (content_id) REFERENCES content(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_links_content ON links(content_id);

        -- Append-only visit log
        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY,
            ip_hash TEXT NOT NULL,
            page_url TEXT NOT NULL,
            user_agent TEXT,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_visits_timestamp ON visits(timestamp);
        CREATE INDEX IF NOT EXISTS idx_visits_page_url ON visits(page_url);
        ",
    )?;

    Ok(())
}
