#[macro_use]
extern crate rocket;

use std::process;
use std::sync::Arc;

use rocket::fs::FileServer;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use rocket_dyn_templates::Template;
use serde_json::{json, Value};

mod analytics;
mod boot;
mod config;
mod db;
mod errors;
mod models;
mod pagination;
mod routes;
mod store;
mod tasks;
mod token;

#[cfg(test)]
mod tests;

use config::AppConfig;
use store::Store;

#[catch(404)]
fn not_found() -> RawHtml<String> {
    RawHtml("<html><body style='font-family:sans-serif;text-align:center;padding:80px'><h1>404</h1><p>Page not found.</p><a href='/'>Home</a></body></html>".to_string())
}

#[catch(500)]
fn server_error() -> RawHtml<String> {
    RawHtml("<html><body style='font-family:sans-serif;text-align:center;padding:80px'><h1>500</h1><p>Internal server error.</p><a href='/'>Home</a></body></html>".to_string())
}

/// JSON body for failures under the API mounts (bad body, auth, no route).
#[catch(default)]
fn json_error(status: Status, _req: &Request) -> (Status, Json<Value>) {
    let reason = status.reason().unwrap_or("Error");
    (status, Json(json!({ "error": reason })))
}

/// State and JSON routes. Shared by the server and the HTTP tests.
pub(crate) fn mount_api(rocket: Rocket<Build>, store: Arc<dyn Store>, cfg: AppConfig) -> Rocket<Build> {
    rocket
        .manage(store)
        .manage(cfg)
        .mount("/admin", routes::admin::routes())
        .mount("/visits", routes::visits::routes())
        .register("/admin", catchers![json_error])
        .register("/visits", catchers![json_error])
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Boot check: create directories, look for templates
    if !boot::run(&cfg).ok() {
        process::exit(1);
    }

    let store = match store::open(&cfg.database) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open {} store: {}", cfg.database.backend, e);
            process::exit(1);
        }
    };

    let mut figment = rocket::Config::figment().merge(("template_dir", boot::TEMPLATE_DIR));
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        figment = figment.merge(("port", port));
    }

    log::info!("{} starting with the {} backend", cfg.site.name, store.backend_name());

    mount_api(rocket::custom(figment), store, cfg)
        .attach(Template::fairing())
        .attach(tasks::BackgroundTasks)
        .mount("/static", FileServer::from(boot::STATIC_DIR))
        .mount("/file", routes::download::routes())
        .mount("/", routes::public::routes())
        .register("/", catchers![not_found, server_error])
}
