use log::{error, info, warn};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;

pub const TEMPLATE_DIR: &str = "website/templates";
pub const STATIC_DIR: &str = "website/static";

/// Templates the public pages render. The site still boots without them,
/// but the matching pages will 500.
const TEMPLATES: &[&str] = &[
    "base.html.tera",
    "content.html.tera",
    "contentdetail.html.tera",
    "default_page.html.tera",
    "about.html.tera",
    "contact.html.tera",
    "privacy.html.tera",
    "visit-tracker.html.tera",
    "file_timer.html.tera",
    "choose_file.html.tera",
];

/// Outcome of the boot checks.
#[derive(Debug, Default, PartialEq)]
pub struct BootReport {
    pub warnings: u32,
    pub errors: u32,
}

impl BootReport {
    pub fn ok(&self) -> bool {
        self.errors == 0
    }
}

/// Run all boot checks. Call this before Rocket launches.
/// Creates missing directories and warns about missing templates and
/// assets. Errors mean the configured storage location is unusable.
pub fn run(cfg: &AppConfig) -> BootReport {
    info!("Marquee boot check starting...");

    let mut report = BootReport::default();

    // ── 1. Directories ─────────────────────────────────
    let data_dir = match cfg.database.backend.as_str() {
        "csv" => Some(cfg.database.csv_dir.clone()),
        _ => Path::new(&cfg.database.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned()),
    };

    let mut dirs = vec![TEMPLATE_DIR.to_string(), format!("{}/css", STATIC_DIR)];
    dirs.extend(data_dir.clone());

    for dir in &dirs {
        let path = Path::new(dir);
        if !path.exists() {
            match fs::create_dir_all(path) {
                Ok(_) => info!("  Created directory: {}", dir),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir, e);
                    report.errors += 1;
                }
            }
        }
    }

    // ── 2. Templates ───────────────────────────────────
    for file in TEMPLATES {
        let path = Path::new(TEMPLATE_DIR).join(file);
        if !path.exists() {
            warn!("  Missing template: {}", path.display());
            report.warnings += 1;
        }
    }

    // ── 3. Static assets ───────────────────────────────
    let css = Path::new(STATIC_DIR).join("css/style.css");
    if !css.exists() {
        warn!("  Missing static asset: {} (pages will be unstyled)", css.display());
        report.warnings += 1;
    }

    // ── 4. Data directory writable ─────────────────────
    if let Some(dir) = data_dir.as_deref() {
        let test_file = Path::new(dir).join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                error!("  Data directory {} not writable: {}", dir, e);
                report.errors += 1;
            }
        }
    }

    // ── 5. Rocket.toml exists ──────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found, using default config");
        report.warnings += 1;
    }

    // ── Summary ────────────────────────────────────────
    if report.errors > 0 {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s).",
            report.errors, report.warnings
        );
    } else if report.warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some pages may not render.",
            report.warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }

    report
}
