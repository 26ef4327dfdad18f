use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analytics;
use crate::errors::{Error, Result};
use crate::models::analytics::UrlCount;
use crate::routes::{AdminKey, ClientIp, UserAgent};
use crate::store::Store;

type Db = State<Arc<dyn Store>>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackRequest {
    pub page_url: Option<String>,
}

/// Body is JSON whatever the Content-Type; malformed bodies and a missing
/// `pageUrl` are both 400.
#[post("/track", data = "<body>")]
pub fn track(
    store: &Db,
    body: Json<TrackRequest>,
    ip: ClientIp,
    ua: UserAgent,
) -> Result<Json<Value>> {
    let page_url = body
        .into_inner()
        .page_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::validation("pageUrl is required"))?;
    analytics::record(store.inner().as_ref(), &page_url, &ip.0, &ua.0);
    Ok(Json(json!({ "message": "Visit tracked!" })))
}

#[post("/deleteAll")]
pub fn delete_all(_admin: AdminKey, store: &Db) -> Result<Json<Value>> {
    let removed = store.visit_delete_all()?;
    log::info!("Deleted {} visits", removed);
    Ok(Json(json!({ "message": "All visits deleted" })))
}

#[get("/today")]
pub fn today(store: &Db) -> Result<Json<Value>> {
    let count = analytics::today(store.inner().as_ref())?;
    Ok(Json(json!({ "count": count })))
}

#[get("/weekly")]
pub fn weekly(store: &Db) -> Result<Json<Value>> {
    let count = analytics::weekly(store.inner().as_ref())?;
    Ok(Json(json!({ "count": count })))
}

#[get("/monthly")]
pub fn monthly(store: &Db) -> Result<Json<Value>> {
    let count = analytics::monthly(store.inner().as_ref())?;
    Ok(Json(json!({ "count": count })))
}

#[get("/top-urls")]
pub fn top_urls(store: &Db) -> Result<Json<Vec<UrlCount>>> {
    Ok(Json(analytics::top_urls(store.inner().as_ref())?))
}

#[get("/last7days")]
pub fn last7days(store: &Db) -> Result<Json<Vec<i64>>> {
    Ok(Json(analytics::daily_series(store.inner().as_ref(), 7)?))
}

#[get("/last30days")]
pub fn last30days(store: &Db) -> Result<Json<Vec<i64>>> {
    Ok(Json(analytics::daily_series(store.inner().as_ref(), 30)?))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        track, delete_all, today, weekly, monthly, top_urls, last7days, last30days,
    ]
}
