use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::models::analytics::{UrlCount, Visit, DAY_FORMAT};
use crate::store::Store;

/// How many URLs the top-pages report returns.
pub const TOP_URL_LIMIT: i64 = 20;

/// Everything the visit dashboard shows, gathered in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct VisitSummary {
    pub today: i64,
    pub weekly: i64,
    pub monthly: i64,
    pub top_urls: Vec<UrlCount>,
    pub last7days: Vec<i64>,
    pub last30days: Vec<i64>,
}

pub fn hash_ip(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store a visit for `page_url`. Failures are logged and swallowed so a
/// broken visit log never breaks the page being served.
pub fn record(store: &dyn Store, page_url: &str, ip: &str, user_agent: &str) {
    let visit = Visit {
        ip_hash: hash_ip(ip),
        page_url: page_url.to_string(),
        user_agent: user_agent.to_string(),
        timestamp: Utc::now(),
    };
    if let Err(e) = store.visit_insert(&visit) {
        log::warn!("Failed to record visit for {}: {}", page_url, e);
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// ── Rolling windows ─────────────────────────────────────

pub fn today(store: &dyn Store) -> Result<i64> {
    today_at(store, Utc::now())
}

pub fn today_at(store: &dyn Store, now: DateTime<Utc>) -> Result<i64> {
    store.visit_count_after(&start_of_day(now))
}

pub fn weekly(store: &dyn Store) -> Result<i64> {
    weekly_at(store, Utc::now())
}

pub fn weekly_at(store: &dyn Store, now: DateTime<Utc>) -> Result<i64> {
    store.visit_count_after(&(now - Duration::days(7)))
}

pub fn monthly(store: &dyn Store) -> Result<i64> {
    monthly_at(store, Utc::now())
}

pub fn monthly_at(store: &dyn Store, now: DateTime<Utc>) -> Result<i64> {
    store.visit_count_after(&(now - Duration::days(30)))
}

pub fn top_urls(store: &dyn Store) -> Result<Vec<UrlCount>> {
    store.visit_top_urls(TOP_URL_LIMIT)
}

// ── Day series ──────────────────────────────────────────

pub fn daily_series(store: &dyn Store, days: u32) -> Result<Vec<i64>> {
    daily_series_at(store, days, Utc::now())
}

/// One count per calendar day (UTC) for the `days` days ending with the day
/// of `now`, oldest first. Days without visits are 0.
pub fn daily_series_at(store: &dyn Store, days: u32, now: DateTime<Utc>) -> Result<Vec<i64>> {
    if days == 0 {
        return Ok(Vec::new());
    }
    let today = start_of_day(now);
    let first = today - Duration::days(i64::from(days) - 1);

    let counts: HashMap<String, i64> = store
        .visit_daily_counts(&first)?
        .into_iter()
        .map(|d| (d.date, d.count))
        .collect();

    Ok((0..i64::from(days))
        .map(|offset| {
            let key = (first + Duration::days(offset)).format(DAY_FORMAT).to_string();
            counts.get(&key).copied().unwrap_or(0)
        })
        .collect())
}

pub fn summary(store: &dyn Store) -> Result<VisitSummary> {
    summary_at(store, Utc::now())
}

pub fn summary_at(store: &dyn Store, now: DateTime<Utc>) -> Result<VisitSummary> {
    Ok(VisitSummary {
        today: today_at(store, now)?,
        weekly: weekly_at(store, now)?,
        monthly: monthly_at(store, now)?,
        top_urls: top_urls(store)?,
        last7days: daily_series_at(store, 7, now)?,
        last30days: daily_series_at(store, 30, now)?,
    })
}

/// Delete visits older than `retention_days` days. 0 disables pruning.
pub fn prune(store: &dyn Store, retention_days: i64) -> Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    store.visit_prune_before(&(Utc::now() - Duration::days(retention_days)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ip_hash_is_sha256_hex() {
        assert_eq!(
            hash_ip("127.0.0.1"),
            "12ca17b49af2289436f303e0166030a21e525d266e209267433801a8fd4071a0"
        );
        assert_eq!(hash_ip("10.0.0.1").len(), 64);
    }

    #[test]
    fn start_of_day_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 23, 59, 59).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap()
        );
    }
}
