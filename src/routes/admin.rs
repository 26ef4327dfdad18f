use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::errors::{Error, Result};
use crate::models::content::{Content, ContentForm, ContentPatch, ContentType, Link, NewLink};
use crate::pagination::paginate_raw;
use crate::routes::AdminKey;
use crate::store::Store;

type Db = State<Arc<dyn Store>>;

#[get("/test")]
pub fn test(_admin: AdminKey) -> &'static str {
    "Admin router works"
}

// ── Content ────────────────────────────────────────────

/// Query string of the admin listing. Values are kept raw so a malformed
/// page or size falls back to the defaults instead of failing the request.
#[derive(Debug, FromForm)]
pub struct ListFilter<'r> {
    keyword: Option<&'r str>,
    #[field(name = "type")]
    content_type: Option<&'r str>,
    page: Option<&'r str>,
    size: Option<&'r str>,
}

/// Paged listing. `keyword` and `type` narrow the result when present.
#[get("/content?<filter..>")]
pub fn list_content(
    _admin: AdminKey,
    store: &Db,
    filter: ListFilter<'_>,
) -> Result<Json<Vec<Content>>> {
    let page = paginate_raw(filter.page, filter.size);
    let keyword = filter.keyword.map(str::trim).filter(|k| !k.is_empty());
    let content_type = filter
        .content_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse::<ContentType>)
        .transpose()?;

    let results = match (keyword, content_type) {
        (Some(kw), Some(t)) => store.search_by_type_and_keyword(t, kw, page)?,
        (None, Some(t)) => store.list_by_type(t, page)?,
        (Some(kw), None) => store.search_by_keyword(kw, page)?,
        (None, None) => store.list_all(page)?,
    };
    Ok(Json(results))
}

#[post("/content", format = "json", data = "<form>")]
pub fn create_content(
    _admin: AdminKey,
    store: &Db,
    form: Json<ContentForm>,
) -> Result<(Status, Json<Content>)> {
    let saved = store.save(&form)?;
    log::info!("Saved content {} ({})", saved.id, saved.name);
    Ok((Status::Created, Json(saved)))
}

#[post("/contents/all", format = "json", data = "<forms>")]
pub fn create_contents(
    _admin: AdminKey,
    store: &Db,
    forms: Json<Vec<ContentForm>>,
) -> Result<Json<Vec<Content>>> {
    if forms.is_empty() {
        return Err(Error::validation("No content provided"));
    }
    let saved = store.save_batch(&forms)?;
    log::info!("Saved {} content rows in batch", saved.len());
    Ok(Json(saved))
}

#[get("/content/<id>")]
pub fn get_content(_admin: AdminKey, store: &Db, id: i64) -> Result<Json<Content>> {
    store
        .find_by_id(id)?
        .map(Json)
        .ok_or_else(|| Error::not_found("Content not found"))
}

/// Fields present in the body overwrite the stored ones; the rest are kept.
#[put("/content/<id>", format = "json", data = "<patch>")]
pub fn update_content(
    _admin: AdminKey,
    store: &Db,
    id: i64,
    patch: Json<ContentPatch>,
) -> Result<Json<Content>> {
    let existing = store
        .content_get(id)?
        .ok_or_else(|| Error::not_found("Content not found"))?;
    let form = patch.into_inner().merge_into(&existing);
    let saved = store.save(&form)?;
    Ok(Json(saved))
}

#[delete("/content/<id>")]
pub fn delete_content(_admin: AdminKey, store: &Db, id: i64) -> Result<Status> {
    if !store.delete_by_id(id)? {
        return Err(Error::not_found("Content not found"));
    }
    log::info!("Deleted content {}", id);
    Ok(Status::NoContent)
}

// ── Links ──────────────────────────────────────────────

#[post("/content/<content_id>/links", format = "json", data = "<link>")]
pub fn add_link(
    _admin: AdminKey,
    store: &Db,
    content_id: i64,
    link: Json<NewLink>,
) -> Result<(Status, Json<Link>)> {
    let created = store.add_link(content_id, &link)?;
    Ok((Status::Created, Json(created)))
}

#[delete("/content/<content_id>/links/<link_id>")]
pub fn delete_link(
    _admin: AdminKey,
    store: &Db,
    content_id: i64,
    link_id: i64,
) -> Result<Status> {
    if !store.delete_link(content_id, link_id)? {
        return Err(Error::not_found("Link not found"));
    }
    Ok(Status::NoContent)
}

// ── Cache ──────────────────────────────────────────────

/// Re-read the backing files. A no-op for SQLite.
#[post("/cache/refresh")]
pub fn refresh_cache(_admin: AdminKey, store: &Db) -> Result<Json<Value>> {
    store.refresh()?;
    log::info!("Refreshed {} store", store.backend_name());
    Ok(Json(json!({
        "message": "Cache refreshed",
        "backend": store.backend_name(),
    })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        test,
        list_content,
        create_content,
        create_contents,
        get_content,
        update_content,
        delete_content,
        add_link,
        delete_link,
        refresh_cache,
    ]
}
