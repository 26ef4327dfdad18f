use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::errors::{Error, Result};

/// Fixed-width UTC timestamp so lexical order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Day key used for bucketing. Always UTC.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// One recorded page access. The raw client IP is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub ip_hash: String,
    pub page_url: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlCount {
    pub page_url: String,
    pub visit_count: i64,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the stored format, the same without millis, and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl Visit {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let raw: String = row.get("timestamp")?;
        let timestamp = parse_timestamp(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("bad visit timestamp '{}'", raw).into(),
            )
        })?;
        Ok(Visit {
            ip_hash: row.get("ip_hash")?,
            page_url: row.get("page_url")?,
            user_agent: row.get::<_, Option<String>>("user_agent")?.unwrap_or_default(),
            timestamp,
        })
    }

    pub fn insert(pool: &DbPool, visit: &Visit) -> Result<()> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO visits (ip_hash, page_url, user_agent, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                visit.ip_hash,
                visit.page_url,
                visit.user_agent,
                format_timestamp(&visit.timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn count_since(pool: &DbPool, since: &DateTime<Utc>) -> Result<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM visits WHERE timestamp >= ?1",
            params![format_timestamp(since)],
            |row| row.get(0),
        )?)
    }

    pub fn count_after(pool: &DbPool, after: &DateTime<Utc>) -> Result<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM visits WHERE timestamp > ?1",
            params![format_timestamp(after)],
            |row| row.get(0),
        )?)
    }

    pub fn top_urls(pool: &DbPool, limit: i64) -> Result<Vec<UrlCount>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT page_url, COUNT(*) AS visit_count
             FROM visits
             GROUP BY page_url
             ORDER BY visit_count DESC, page_url ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(UrlCount {
                page_url: row.get(0)?,
                visit_count: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Per-day counts for visits at or after `from`. Days without visits are absent.
    pub fn daily_counts(pool: &DbPool, from: &DateTime<Utc>) -> Result<Vec<DailyCount>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT DATE(timestamp) AS visit_date, COUNT(*) AS visit_count
             FROM visits
             WHERE timestamp >= ?1
             GROUP BY visit_date
             ORDER BY visit_date ASC",
        )?;
        let rows = stmt.query_map(params![format_timestamp(from)], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    #[cfg(test)]
    pub fn list(pool: &DbPool) -> Result<Vec<Visit>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM visits ORDER BY timestamp ASC")?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn delete_all(pool: &DbPool) -> Result<usize> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM visits", [])?)
    }

    pub fn prune_before(pool: &DbPool, before: &DateTime<Utc>) -> Result<usize> {
        let conn = pool.get()?;
        Ok(conn.execute(
            "DELETE FROM visits WHERE timestamp < ?1",
            params![format_timestamp(before)],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(&a), "2026-01-02 03:04:05.000");
    }

    #[test]
    fn timestamp_parsing_accepts_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-01 12:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T17:30:00+05:30"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
