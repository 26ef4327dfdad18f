use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "marquee.toml";

/// Application settings read from `marquee.toml`, with environment overrides.
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub site: SiteConfig,
    pub download: DownloadConfig,
    pub admin: AdminConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// "sqlite" or "csv"
    pub backend: String,
    pub path: String,
    pub csv_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: "sqlite".to_string(),
            path: "website/db/marquee.db".to_string(),
            csv_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    /// Cards per public listing page. Clamped like any other page size.
    pub public_page_size: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            name: "Marquee".to_string(),
            public_page_size: 12,
        }
    }
}

/// The file link handed out for a token is `prefix_url + id + suffix_url`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub prefix_url: String,
    pub suffix_url: String,
}

impl DownloadConfig {
    pub fn file_url(&self, id: i64) -> String {
        format!("{}{}{}", self.prefix_url, id, self.suffix_url)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Empty leaves the admin routes open.
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// 0 keeps visits forever.
    pub retention_days: i64,
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::validation(format!("invalid config: {}", e)))
    }

    /// Apply the environment overrides on top of the file values.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        let set = |key: &str, slot: &mut String| {
            if let Some(v) = get(key).filter(|v| !v.trim().is_empty()) {
                *slot = v;
            }
        };
        set("MARQUEE_DB_BACKEND", &mut self.database.backend);
        set("MARQUEE_DB_PATH", &mut self.database.path);
        set("MARQUEE_CSV_DIR", &mut self.database.csv_dir);
        set("APP_PREFIX_URL", &mut self.download.prefix_url);
        set("APP_SUFFIX_URL", &mut self.download.suffix_url);
        set("MARQUEE_ADMIN_TOKEN", &mut self.admin.token);
        self.database.backend = self.database.backend.trim().to_ascii_lowercase();
    }
}

/// Read the config file named by `MARQUEE_CONFIG` (default `marquee.toml`).
/// A missing file yields defaults; a malformed one is an error.
pub fn load() -> Result<AppConfig> {
    let path = env::var("MARQUEE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut cfg = if Path::new(&path).exists() {
        let raw = fs::read_to_string(&path)?;
        AppConfig::from_toml(&raw)?
    } else {
        log::warn!("{} not found, using defaults", path);
        AppConfig::default()
    };
    cfg.apply_env(|key| env::var(key).ok());
    Ok(cfg)
}
