//! Flat-file backend.
//!
//! Four CSV files with header rows live in one directory:
//! `content_rows.csv`, `links_rows.csv`, `visits_rows.csv` and `sequences.csv`.
//! Content and links are held in an in-memory [`Snapshot`] that is read once
//! and then served from memory until [`CsvStore::refresh`]. Every mutation goes
//! through a single writer lock, rewrites the affected files and swaps in a new
//! snapshot. Visits are append-only and are appended to their file directly.
//!
//! The writer lock only serialises writers inside this process. Two processes
//! sharing a directory still overwrite each other's changes.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::models::analytics::{
    format_timestamp, parse_timestamp, DailyCount, UrlCount, Visit, DAY_FORMAT,
};
use crate::models::content::{Content, ContentForm, ContentQuery, ContentType, Link, NewLink};
use crate::pagination::Page;

use super::Store;

const CONTENT_FILE: &str = "content_rows.csv";
const LINKS_FILE: &str = "links_rows.csv";
const VISITS_FILE: &str = "visits_rows.csv";
const SEQUENCES_FILE: &str = "sequences.csv";

/// A CSV table row. Columns are read as text and normalised afterwards.
trait CsvRow: Serialize + DeserializeOwned {
    const HEADERS: &'static [&'static str];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ContentRow {
    id: String,
    name: String,
    rating: String,
    genre: String,
    plot_summary: String,
    poster_url: String,
    release_year: String,
    duration: String,
    #[serde(rename = "type")]
    content_type: String,
}

impl CsvRow for ContentRow {
    const HEADERS: &'static [&'static str] = &[
        "id",
        "name",
        "rating",
        "genre",
        "plot_summary",
        "poster_url",
        "release_year",
        "duration",
        "type",
    ];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct LinkRow {
    id: String,
    title: String,
    link: String,
    content_id: String,
}

impl CsvRow for LinkRow {
    const HEADERS: &'static [&'static str] = &["id", "title", "link", "content_id"];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct VisitRow {
    ip_hash: String,
    page_url: String,
    user_agent: String,
    timestamp: String,
}

impl CsvRow for VisitRow {
    const HEADERS: &'static [&'static str] = &["ip_hash", "page_url", "user_agent", "timestamp"];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SequenceRow {
    name: String,
    value: String,
}

impl CsvRow for SequenceRow {
    const HEADERS: &'static [&'static str] = &["name", "value"];
}

fn parse_num<T: std::str::FromStr + Default>(raw: &str) -> T {
    raw.trim().parse().unwrap_or_default()
}

impl ContentRow {
    fn into_content(self) -> Option<Content> {
        let id: i64 = self.id.trim().parse().ok()?;
        let content_type: ContentType = self.content_type.parse().ok()?;
        Some(Content {
            id,
            name: self.name,
            rating: parse_num(&self.rating),
            genre: self.genre,
            plot_summary: self.plot_summary,
            poster_url: self.poster_url,
            release_year: parse_num(&self.release_year),
            duration: self.duration,
            content_type,
            links: None,
        })
    }
}

impl From<&Content> for ContentRow {
    fn from(c: &Content) -> Self {
        ContentRow {
            id: c.id.to_string(),
            name: c.name.clone(),
            rating: c.rating.to_string(),
            genre: c.genre.clone(),
            plot_summary: c.plot_summary.clone(),
            poster_url: c.poster_url.clone(),
            release_year: c.release_year.to_string(),
            duration: c.duration.clone(),
            content_type: c.content_type.as_str().to_string(),
        }
    }
}

impl LinkRow {
    fn into_link(self) -> Option<Link> {
        Some(Link {
            id: self.id.trim().parse().ok()?,
            title: self.title,
            link: self.link,
            content_id: self.content_id.trim().parse().ok()?,
        })
    }
}

impl From<&Link> for LinkRow {
    fn from(l: &Link) -> Self {
        LinkRow {
            id: l.id.to_string(),
            title: l.title.clone(),
            link: l.link.clone(),
            content_id: l.content_id.to_string(),
        }
    }
}

impl VisitRow {
    fn into_visit(self) -> Option<Visit> {
        Some(Visit {
            timestamp: parse_timestamp(&self.timestamp)?,
            ip_hash: self.ip_hash,
            page_url: self.page_url,
            user_agent: self.user_agent,
        })
    }
}

impl From<&Visit> for VisitRow {
    fn from(v: &Visit) -> Self {
        VisitRow {
            ip_hash: v.ip_hash.clone(),
            page_url: v.page_url.clone(),
            user_agent: v.user_agent.clone(),
            timestamp: format_timestamp(&v.timestamp),
        }
    }
}

/// Content and links as last read from (or written to) disk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub contents: Vec<Content>,
    pub links: Vec<Link>,
    /// Highest id ever handed out, including deleted rows.
    last_content_id: i64,
    last_link_id: i64,
}

impl Snapshot {
    fn next_content_id(&mut self) -> i64 {
        self.last_content_id += 1;
        self.last_content_id
    }

    fn next_link_id(&mut self) -> i64 {
        self.last_link_id += 1;
        self.last_link_id
    }

    fn content_exists(&self, id: i64) -> bool {
        self.contents.iter().any(|c| c.id == id)
    }
}

/// Which files a mutation touched.
#[derive(Debug, Clone, Copy, Default)]
struct Dirty {
    content: bool,
    links: bool,
}

pub struct CsvStore {
    dir: PathBuf,
    cache: RwLock<Option<Arc<Snapshot>>>,
    visits: RwLock<Option<Vec<Visit>>>,
    writer: Mutex<()>,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::storage("csv store lock poisoned")
}

impl CsvStore {
    /// Point the store at `dir`, creating the directory if needed.
    /// Nothing is read until the first `load`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(CsvStore {
            dir,
            cache: RwLock::new(None),
            visits: RwLock::new(None),
            writer: Mutex::new(()),
        })
    }

    /// Read the files unless a snapshot is already cached.
    pub fn load(&self) -> Result<Arc<Snapshot>> {
        if let Some(snap) = self.cache.read().map_err(poisoned)?.as_ref() {
            return Ok(Arc::clone(snap));
        }
        let mut cache = self.cache.write().map_err(poisoned)?;
        if let Some(snap) = cache.as_ref() {
            return Ok(Arc::clone(snap));
        }
        let snap = Arc::new(self.read_snapshot()?);
        *cache = Some(Arc::clone(&snap));
        Ok(snap)
    }

    /// The cached snapshot, loading it first if necessary.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.load()
    }

    fn read_snapshot(&self) -> Result<Snapshot> {
        log::info!("Loading CSV data from {}", self.dir.display());

        let contents: Vec<Content> = read_rows::<ContentRow>(&self.path(CONTENT_FILE))?
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                let parsed = row.into_content();
                if parsed.is_none() {
                    log::warn!("Skipping content row with id '{}': bad id or type", id);
                }
                parsed
            })
            .collect();

        let links: Vec<Link> = read_rows::<LinkRow>(&self.path(LINKS_FILE))?
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                let parsed = row.into_link();
                if parsed.is_none() {
                    log::warn!("Skipping link row with id '{}': bad id", id);
                }
                parsed
            })
            .collect();

        let sequences: HashMap<String, i64> = read_rows::<SequenceRow>(&self.path(SEQUENCES_FILE))?
            .into_iter()
            .map(|row| (row.name.trim().to_string(), parse_num(&row.value)))
            .collect();

        let max_content = contents.iter().map(|c| c.id).max().unwrap_or(0);
        let max_link = links.iter().map(|l| l.id).max().unwrap_or(0);

        Ok(Snapshot {
            last_content_id: max_content.max(sequences.get("content").copied().unwrap_or(0)),
            last_link_id: max_link.max(sequences.get("links").copied().unwrap_or(0)),
            contents,
            links,
        })
    }

    fn read_visits(&self) -> Result<Vec<Visit>> {
        Ok(read_rows::<VisitRow>(&self.path(VISITS_FILE))?
            .into_iter()
            .filter_map(VisitRow::into_visit)
            .collect())
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Apply `f` to a copy of the snapshot under the writer lock, persist the
    /// touched files, then publish the copy. Every file is staged before any
    /// is renamed into place, so a failed write leaves the old files intact.
    fn mutate<R>(&self, f: impl FnOnce(&mut Snapshot) -> Result<(R, Dirty)>) -> Result<R> {
        let _guard = self.writer.lock().map_err(poisoned)?;
        let current = self.load()?;
        let mut next = (*current).clone();
        let (out, dirty) = f(&mut next)?;

        let mut staged = Vec::new();
        if let Err(e) = self.stage_snapshot(&next, dirty, &mut staged) {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }
        for (tmp, path) in &staged {
            fs::rename(tmp, path)?;
        }

        *self.cache.write().map_err(poisoned)? = Some(Arc::new(next));
        Ok(out)
    }

    fn stage_snapshot(
        &self,
        next: &Snapshot,
        dirty: Dirty,
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<()> {
        if dirty.content {
            let rows: Vec<ContentRow> = next.contents.iter().map(ContentRow::from).collect();
            let path = self.path(CONTENT_FILE);
            staged.push((stage_rows(&path, &rows)?, path));
        }
        if dirty.links {
            let rows: Vec<LinkRow> = next.links.iter().map(LinkRow::from).collect();
            let path = self.path(LINKS_FILE);
            staged.push((stage_rows(&path, &rows)?, path));
        }
        if dirty.content || dirty.links {
            let rows = vec![
                SequenceRow {
                    name: "content".to_string(),
                    value: next.last_content_id.to_string(),
                },
                SequenceRow {
                    name: "links".to_string(),
                    value: next.last_link_id.to_string(),
                },
            ];
            let path = self.path(SEQUENCES_FILE);
            staged.push((stage_rows(&path, &rows)?, path));
        }
        Ok(())
    }

    fn with_visits<R>(&self, f: impl FnOnce(&[Visit]) -> R) -> Result<R> {
        {
            let visits = self.visits.read().map_err(poisoned)?;
            if let Some(v) = visits.as_ref() {
                return Ok(f(v));
            }
        }
        let mut visits = self.visits.write().map_err(poisoned)?;
        if visits.is_none() {
            *visits = Some(self.read_visits()?);
        }
        Ok(f(visits.as_deref().unwrap_or_default()))
    }

    /// Rewrite the visit file with the rows `keep` accepts.
    fn rewrite_visits(&self, keep: impl Fn(&Visit) -> bool) -> Result<usize> {
        let _guard = self.writer.lock().map_err(poisoned)?;
        let mut all = match self.visits.read().map_err(poisoned)?.as_ref() {
            Some(v) => v.clone(),
            None => self.read_visits()?,
        };
        let before = all.len();
        all.retain(|v| keep(v));
        let rows: Vec<VisitRow> = all.iter().map(VisitRow::from).collect();
        write_rows(&self.path(VISITS_FILE), &rows)?;
        let removed = before - all.len();
        *self.visits.write().map_err(poisoned)? = Some(all);
        Ok(removed)
    }
}

fn read_rows<T: CsvRow>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            // header is line 1
            Err(e) => log::warn!("{}: skipping line {}: {}", path.display(), idx + 2, e),
        }
    }
    Ok(rows)
}

/// Write header plus rows to a temp file, then rename over the target.
/// Write `rows` to a temp file next to `path` and return the temp path.
fn stage_rows<T: CsvRow>(path: &Path, rows: &[T]) -> Result<PathBuf> {
    let tmp = path.with_extension("csv.tmp");
    let file = File::create(&tmp)?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(tmp)
}

fn write_rows<T: CsvRow>(path: &Path, rows: &[T]) -> Result<()> {
    let tmp = stage_rows(path, rows)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn append_row<T: CsvRow>(path: &Path, row: &T) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if is_empty {
        writer.write_record(T::HEADERS)?;
    }
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

impl Store for CsvStore {
    // ── Lifecycle ───────────────────────────────────────────────────

    fn backend_name(&self) -> &str {
        "csv"
    }

    fn refresh(&self) -> Result<()> {
        let _guard = self.writer.lock().map_err(poisoned)?;
        let snap = self.read_snapshot()?;
        let visits = self.read_visits()?;
        *self.cache.write().map_err(poisoned)? = Some(Arc::new(snap));
        *self.visits.write().map_err(poisoned)? = Some(visits);
        Ok(())
    }

    // ── Content ─────────────────────────────────────────────────────

    fn content_query(&self, query: &ContentQuery, page: Page) -> Result<Vec<Content>> {
        let snap = self.snapshot()?;
        let mut matched: Vec<&Content> = snap.contents.iter().filter(|c| query.matches(c)).collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matched
            .into_iter()
            .skip(page.skip())
            .take(page.take())
            .cloned()
            .collect())
    }

    fn content_count(&self, query: &ContentQuery) -> Result<i64> {
        let snap = self.snapshot()?;
        Ok(snap.contents.iter().filter(|c| query.matches(c)).count() as i64)
    }

    fn content_get(&self, id: i64) -> Result<Option<Content>> {
        let snap = self.snapshot()?;
        Ok(snap.contents.iter().find(|c| c.id == id).cloned())
    }

    fn content_insert(&self, form: &ContentForm) -> Result<Content> {
        form.validate()?;
        self.mutate(|snap| {
            let id = snap.next_content_id();
            let content = form.to_content(id)?;
            snap.contents.push(content.clone());
            for l in &form.links {
                let link_id = snap.next_link_id();
                snap.links.push(Link {
                    id: link_id,
                    title: l.title.clone(),
                    link: l.link.clone(),
                    content_id: id,
                });
            }
            let dirty = Dirty {
                content: true,
                links: !form.links.is_empty(),
            };
            Ok((content, dirty))
        })
    }

    fn content_replace(&self, id: i64, form: &ContentForm) -> Result<Content> {
        let updated = form.to_content(id)?;
        self.mutate(|snap| {
            let slot = snap
                .contents
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| Error::not_found(format!("content {}", id)))?;
            *slot = updated.clone();
            Ok((
                updated,
                Dirty {
                    content: true,
                    links: false,
                },
            ))
        })
    }

    fn content_delete(&self, id: i64) -> Result<bool> {
        self.mutate(|snap| {
            let before = snap.contents.len();
            snap.contents.retain(|c| c.id != id);
            let removed = snap.contents.len() != before;

            let links_before = snap.links.len();
            snap.links.retain(|l| l.content_id != id);
            let links_removed = snap.links.len() != links_before;

            Ok((
                removed,
                Dirty {
                    content: removed,
                    links: links_removed,
                },
            ))
        })
    }

    // ── Links ───────────────────────────────────────────────────────

    fn links_for(&self, content_id: i64) -> Result<Vec<Link>> {
        let snap = self.snapshot()?;
        let mut links: Vec<Link> = snap
            .links
            .iter()
            .filter(|l| l.content_id == content_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.id);
        Ok(links)
    }

    fn link_insert(&self, content_id: i64, link: &NewLink) -> Result<Link> {
        self.mutate(|snap| {
            if !snap.content_exists(content_id) {
                return Err(Error::not_found(format!("content {}", content_id)));
            }
            let created = Link {
                id: snap.next_link_id(),
                title: link.title.clone(),
                link: link.link.clone(),
                content_id,
            };
            snap.links.push(created.clone());
            Ok((
                created,
                Dirty {
                    content: false,
                    links: true,
                },
            ))
        })
    }

    fn link_delete(&self, content_id: i64, link_id: i64) -> Result<bool> {
        self.mutate(|snap| {
            let before = snap.links.len();
            snap.links
                .retain(|l| !(l.id == link_id && l.content_id == content_id));
            let removed = snap.links.len() != before;
            Ok((
                removed,
                Dirty {
                    content: false,
                    links: removed,
                },
            ))
        })
    }

    // ── Visits ──────────────────────────────────────────────────────

    fn visit_insert(&self, visit: &Visit) -> Result<()> {
        let _guard = self.writer.lock().map_err(poisoned)?;
        append_row(&self.path(VISITS_FILE), &VisitRow::from(visit))?;
        let mut visits = self.visits.write().map_err(poisoned)?;
        if let Some(v) = visits.as_mut() {
            v.push(visit.clone());
        }
        Ok(())
    }

    fn visit_count_since(&self, since: &DateTime<Utc>) -> Result<i64> {
        self.with_visits(|v| v.iter().filter(|x| x.timestamp >= *since).count() as i64)
    }

    fn visit_count_after(&self, after: &DateTime<Utc>) -> Result<i64> {
        self.with_visits(|v| v.iter().filter(|x| x.timestamp > *after).count() as i64)
    }

    fn visit_top_urls(&self, limit: i64) -> Result<Vec<UrlCount>> {
        self.with_visits(|v| {
            let mut counts: HashMap<&str, i64> = HashMap::new();
            for visit in v {
                *counts.entry(visit.page_url.as_str()).or_default() += 1;
            }
            let mut ranked: Vec<UrlCount> = counts
                .into_iter()
                .map(|(url, count)| UrlCount {
                    page_url: url.to_string(),
                    visit_count: count,
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.visit_count
                    .cmp(&a.visit_count)
                    .then_with(|| a.page_url.cmp(&b.page_url))
            });
            ranked.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
            ranked
        })
    }

    fn visit_daily_counts(&self, from: &DateTime<Utc>) -> Result<Vec<DailyCount>> {
        self.with_visits(|v| {
            let mut days: BTreeMap<String, i64> = BTreeMap::new();
            for visit in v.iter().filter(|x| x.timestamp >= *from) {
                *days
                    .entry(visit.timestamp.format(DAY_FORMAT).to_string())
                    .or_default() += 1;
            }
            days.into_iter()
                .map(|(date, count)| DailyCount { date, count })
                .collect()
        })
    }

    fn visit_delete_all(&self) -> Result<usize> {
        self.rewrite_visits(|_| false)
    }

    fn visit_prune_before(&self, before: &DateTime<Utc>) -> Result<usize> {
        self.rewrite_visits(|v| v.timestamp >= *before)
    }
}
