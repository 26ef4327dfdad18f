use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// LIMIT / OFFSET pair handed to every list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Everything, from the first row. Used for counts-vs-lists checks and exports.
    pub fn unbounded() -> Self {
        Page {
            limit: i64::MAX,
            offset: 0,
        }
    }

    pub fn skip(&self) -> usize {
        usize::try_from(self.offset).unwrap_or(0)
    }

    pub fn take(&self) -> usize {
        usize::try_from(self.limit).unwrap_or(usize::MAX)
    }
}

/// Turn a 0-based page number and a page size into LIMIT / OFFSET.
///
/// Non-positive sizes fall back to [`DEFAULT_PAGE_SIZE`], sizes above
/// [`MAX_PAGE_SIZE`] are clamped, negative pages are treated as page 0.
pub fn paginate(page: i64, size: i64) -> Page {
    let limit = if size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        size.min(MAX_PAGE_SIZE)
    };
    let offset = page.max(0).saturating_mul(limit);
    Page { limit, offset }
}

/// Lenient variant for raw query-string values: anything that is not an
/// integer behaves like a missing value.
pub fn paginate_raw(page: Option<&str>, size: Option<&str>) -> Page {
    let page = page.and_then(|p| p.trim().parse::<i64>().ok()).unwrap_or(0);
    let size = size
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE);
    paginate(page, size)
}

/// `ceil(total / size)`; zero when there is nothing to show.
pub fn total_pages(total: i64, size: i64) -> i64 {
    if total <= 0 || size <= 0 {
        return 0;
    }
    (total + size - 1) / size
}
