use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::analytics;
use crate::config::AppConfig;
use crate::store::Store;

/// Minutes between visit retention sweeps.
const RETENTION_INTERVAL_MINUTES: u64 = 60;

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (Some(store), Some(cfg)) = (
            rocket.state::<Arc<dyn Store>>(),
            rocket.state::<AppConfig>(),
        ) else {
            log::error!("[task] Store or config missing from managed state, tasks not started");
            return;
        };

        let retention_days = cfg.analytics.retention_days;
        if retention_days <= 0 {
            log::info!("[task] Visit retention disabled, keeping all visits");
            return;
        }

        // Visit retention task
        let s = Arc::clone(store);
        tokio::spawn(async move {
            loop {
                match analytics::prune(&*s, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Pruned {} visits older than {} days", count, retention_days);
                        }
                    }
                    Err(e) => log::error!("[task] Visit retention failed: {}", e),
                }
                tokio::time::sleep(Duration::from_secs(RETENTION_INTERVAL_MINUTES * 60)).await;
            }
        });

        log::info!("[task] Background tasks started");
    }
}
