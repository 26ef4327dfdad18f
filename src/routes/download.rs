use std::sync::Arc;

use rocket::http::Status;
use rocket::State;
use rocket_dyn_templates::Template;
use serde_json::json;

use crate::config::AppConfig;
use crate::routes::public::{default_page, render_page, Meta};
use crate::store::Store;
use crate::token;

type Db = State<Arc<dyn Store>>;

#[get("/")]
pub fn index(cfg: &State<AppConfig>) -> Template {
    default_page(
        cfg,
        json!({ "message": format!("Welcome to {}!", cfg.site.name) }),
    )
}

/// Countdown page that sends the visitor on to `/file/choose/<token>`.
#[get("/fetch/<token>")]
pub fn fetch(cfg: &State<AppConfig>, token: &str) -> Template {
    render_page(
        cfg,
        "file_timer",
        json!({ "token": token }),
        Meta::new(format!("Preparing your file | {}", cfg.site.name), ""),
    )
}

#[get("/choose/<token>")]
pub fn choose(store: &Db, cfg: &State<AppConfig>, token: &str) -> (Status, Template) {
    let id = match token::decode(token) {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Rejected download token: {}", e);
            return (
                Status::BadRequest,
                default_page(cfg, json!({ "error": "Invalid or expired token." })),
            );
        }
    };

    match store.find_by_id(id) {
        Ok(Some(content)) => {
            let links = content.links.clone().unwrap_or_default();
            (
                Status::Ok,
                render_page(
                    cfg,
                    "choose_file",
                    json!({
                        "token": token,
                        "content": content,
                        "links": links,
                    }),
                    Meta::new(format!("{} | Download | {}", content.name, cfg.site.name), ""),
                ),
            )
        }
        Ok(None) => (
            Status::NotFound,
            default_page(
                cfg,
                json!({ "error": format!("Content not found for ID: {}", id) }),
            ),
        ),
        Err(e) => {
            log::error!("Download lookup for {} failed: {}", id, e);
            (
                Status::InternalServerError,
                default_page(cfg, json!({ "error": "Something went wrong." })),
            )
        }
    }
}

/// Plain-text file link for a token.
#[get("/getting?<token>")]
pub fn getting(
    cfg: &State<AppConfig>,
    token: Option<&str>,
) -> Result<String, (Status, &'static str)> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or((Status::BadRequest, "Missing token."))?;
    let id = token::decode(token).map_err(|e| {
        log::warn!("Rejected download token: {}", e);
        (Status::BadRequest, "Invalid token.")
    })?;
    Ok(cfg.download.file_url(id))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, fetch, choose, getting]
}
