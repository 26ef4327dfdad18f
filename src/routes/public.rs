use std::sync::Arc;

use rocket::http::Status;
use rocket::State;
use rocket_dyn_templates::Template;
use serde_json::{json, Value};

use crate::analytics;
use crate::config::AppConfig;
use crate::errors::Error;
use crate::models::content::{Content, ContentType};
use crate::pagination::{paginate, total_pages};
use crate::routes::{ClientIp, UserAgent};
use crate::store::Store;
use crate::token;

type Db = State<Arc<dyn Store>>;
type PageResult = Result<Template, Status>;

/// Title, description and keywords for the `<head>` of a page.
pub struct Meta {
    pub title: String,
    pub description: String,
    pub keywords: String,
}

impl Meta {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Meta {
            title: title.into(),
            description: description.into(),
            keywords: String::new(),
        }
    }

    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }
}

/// Render `view` with `data` plus the site-wide fields every layout reads.
pub fn render_page(cfg: &AppConfig, view: &'static str, data: Value, meta: Meta) -> Template {
    let mut context = match data {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let site = &cfg.site.name;
    context.insert("site_name".into(), json!(site));
    context.insert(
        "page_title".into(),
        json!(if meta.title.is_empty() { site.clone() } else { meta.title }),
    );
    context.insert(
        "page_description".into(),
        json!(if meta.description.is_empty() {
            format!("Explore movies and web series on {}.", site)
        } else {
            meta.description
        }),
    );
    context.insert(
        "page_keywords".into(),
        json!(if meta.keywords.is_empty() {
            format!("movies, webseries, {}", site)
        } else {
            meta.keywords
        }),
    );
    Template::render(view, Value::Object(context))
}

pub fn default_page(cfg: &AppConfig, data: Value) -> Template {
    render_page(
        cfg,
        "default_page",
        data,
        Meta::new(
            format!("Page Not Found | {}", cfg.site.name),
            "The page you are looking for doesn't exist. Explore the latest movies instead.",
        ),
    )
}

fn server_error(e: Error) -> Status {
    log::error!("Page render failed: {}", e);
    Status::InternalServerError
}

/// Lenient 0-based page number from the query string.
fn page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(0)
        .max(0)
}

/// Card data for listing templates.
fn cards(contents: &[Content]) -> Vec<Value> {
    contents
        .iter()
        .map(|c| {
            json!({
                "content": c,
                "path": c.detail_path(),
            })
        })
        .collect()
}

/// "sci-fi" -> "Sci Fi"
pub fn display_genre(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for ch in raw.replace('-', " ").chars() {
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

// ── Listings ───────────────────────────────────────────

fn listing(
    store: &dyn Store,
    cfg: &AppConfig,
    content_type: ContentType,
    page: Option<&str>,
    keyword: Option<&str>,
) -> PageResult {
    let current_page = page_number(page);
    let page = paginate(current_page, cfg.site.public_page_size);
    let keyword = keyword.map(str::trim).unwrap_or("");

    let contents = if keyword.is_empty() {
        store.list_by_type(content_type, page)
    } else {
        store.search_by_type_and_keyword(content_type, keyword, page)
    }
    .map_err(server_error)?;
    let total = store
        .count_by_type_and_keyword(content_type, keyword)
        .map_err(server_error)?;

    let (segment, label) = match content_type {
        ContentType::Movie => ("movies", "Movies"),
        ContentType::Webseries => ("webseries", "Web Series"),
    };
    let title = if keyword.is_empty() {
        format!("Latest {} | {}", label, cfg.site.name)
    } else {
        format!("Search Results for \"{}\" | {} | {}", keyword, label, cfg.site.name)
    };

    Ok(render_page(
        cfg,
        "content",
        json!({
            "contents": cards(&contents),
            "current_page": current_page,
            "total_pages": total_pages(total, page.limit),
            "keyword": keyword,
            "content_type": segment,
            "current_path": format!("/{}", segment),
        }),
        Meta::new(title, format!("Watch and explore the latest {} online.", label.to_lowercase()))
            .keywords(format!("{}, HD, download, stream", label.to_lowercase())),
    ))
}

#[get("/?<page>&<keyword>")]
pub fn home(
    store: &Db,
    cfg: &State<AppConfig>,
    page: Option<&str>,
    keyword: Option<&str>,
) -> PageResult {
    listing(store.inner().as_ref(), cfg, ContentType::Movie, page, keyword)
}

#[get("/movies?<page>&<keyword>")]
pub fn movies(
    store: &Db,
    cfg: &State<AppConfig>,
    page: Option<&str>,
    keyword: Option<&str>,
) -> PageResult {
    listing(store.inner().as_ref(), cfg, ContentType::Movie, page, keyword)
}

#[get("/webseries?<page>&<keyword>")]
pub fn webseries(
    store: &Db,
    cfg: &State<AppConfig>,
    page: Option<&str>,
    keyword: Option<&str>,
) -> PageResult {
    listing(store.inner().as_ref(), cfg, ContentType::Webseries, page, keyword)
}

#[get("/genre/<genre>?<page>")]
pub fn by_genre(store: &Db, cfg: &State<AppConfig>, genre: &str, page: Option<&str>) -> PageResult {
    let current_page = page_number(page);
    let page = paginate(current_page, cfg.site.public_page_size);

    let contents = store
        .list_by_genre(genre, page)
        .map_err(server_error)?;
    let total = store.count_by_genre(genre).map_err(server_error)?;
    let name = display_genre(genre);

    Ok(render_page(
        cfg,
        "content",
        json!({
            "contents": cards(&contents),
            "current_page": current_page,
            "total_pages": total_pages(total, page.limit),
            "genre": name,
            "content_type": "all",
            "current_path": format!("/genre/{}", genre),
        }),
        Meta::new(
            format!("{} Movies & Web Series | {}", name, cfg.site.name),
            format!("Explore top-rated {} movies and web series.", name),
        )
        .keywords(format!("{}, movies, webseries", name)),
    ))
}

/// Keyword search over both types: one page of movies followed by one page
/// of web series.
#[get("/search?<keyword>&<page>")]
pub fn search(
    store: &Db,
    cfg: &State<AppConfig>,
    keyword: Option<&str>,
    page: Option<&str>,
) -> PageResult {
    let current_page = page_number(page);
    let page = paginate(current_page, cfg.site.public_page_size);
    let keyword = keyword.map(str::trim).unwrap_or("");

    let mut contents = Vec::new();
    let mut total = 0;
    for t in ContentType::ALL {
        contents.extend(
            store
                .search_by_type_and_keyword(t, keyword, page)
                .map_err(server_error)?,
        );
        total += store
            .count_by_type_and_keyword(t, keyword)
            .map_err(server_error)?;
    }

    Ok(render_page(
        cfg,
        "content",
        json!({
            "contents": cards(&contents),
            "current_page": current_page,
            "total_pages": total_pages(total, page.limit),
            "keyword": keyword,
            "content_type": "all",
            "current_path": "/search",
        }),
        Meta::new(
            format!("Search Results for \"{}\" | {}", keyword, cfg.site.name),
            format!("Find the best movies and web series for \"{}\".", keyword),
        ),
    ))
}

// ── Detail pages ───────────────────────────────────────

fn detail(
    store: &dyn Store,
    cfg: &AppConfig,
    content_type: ContentType,
    id: i64,
    ip: &ClientIp,
    ua: &UserAgent,
) -> Result<(Status, Template), Status> {
    let Some(content) = store
        .find_by_id_and_type(id, content_type)
        .map_err(server_error)?
    else {
        return Ok((Status::NotFound, default_page(cfg, json!({}))));
    };

    analytics::record(store, &format!("movie-detail-{}", content.name), &ip.0, &ua.0);

    let token = token::encode(content.id);
    let title = format!("{} ({}) | {}", content.name, content.release_year, cfg.site.name);
    let description: String = content.plot_summary.chars().take(150).collect();
    let keywords = format!(
        "{}, {}, {}, {}",
        content.name,
        content.genre,
        content_type.url_segment(),
        cfg.site.name
    );

    let links = content.links.clone().unwrap_or_default();
    Ok((
        Status::Ok,
        render_page(
            cfg,
            "contentdetail",
            json!({
                "type_name": content_type.url_segment(),
                "current_path": content.detail_path(),
                "download_path": format!("/file/fetch/{}", token),
                "content": content,
                "links": links,
            }),
            Meta::new(title, description).keywords(keywords),
        ),
    ))
}

#[get("/movie/<id>/<_>")]
pub fn movie_detail(
    store: &Db,
    cfg: &State<AppConfig>,
    id: i64,
    ip: ClientIp,
    ua: UserAgent,
) -> Result<(Status, Template), Status> {
    detail(store.inner().as_ref(), cfg, ContentType::Movie, id, &ip, &ua)
}

#[get("/webseries/<id>/<_>")]
pub fn webseries_detail(
    store: &Db,
    cfg: &State<AppConfig>,
    id: i64,
    ip: ClientIp,
    ua: UserAgent,
) -> Result<(Status, Template), Status> {
    detail(store.inner().as_ref(), cfg, ContentType::Webseries, id, &ip, &ua)
}

// ── Static pages ───────────────────────────────────────

#[get("/about")]
pub fn about(cfg: &State<AppConfig>) -> Template {
    render_page(
        cfg,
        "about",
        json!({ "current_path": "/about" }),
        Meta::new(
            format!("About Us | {}", cfg.site.name),
            "Learn more about us, your go-to platform for movies and web series.",
        ),
    )
}

#[get("/contact")]
pub fn contact(cfg: &State<AppConfig>) -> Template {
    render_page(
        cfg,
        "contact",
        json!({ "current_path": "/contact" }),
        Meta::new(
            format!("Contact Us | {}", cfg.site.name),
            "Have questions or suggestions? Get in touch.",
        ),
    )
}

#[get("/privacy")]
pub fn privacy(cfg: &State<AppConfig>) -> Template {
    render_page(
        cfg,
        "privacy",
        json!({ "current_path": "/privacy" }),
        Meta::new(
            format!("Privacy Policy | {}", cfg.site.name),
            "How visit data is collected and stored.",
        ),
    )
}

// ── Visit dashboard ────────────────────────────────────

#[get("/data/visits")]
pub fn visit_dashboard(store: &Db, cfg: &State<AppConfig>) -> PageResult {
    let summary = analytics::summary(store.inner().as_ref()).map_err(server_error)?;
    let top_urls: Vec<&str> = summary.top_urls.iter().map(|u| u.page_url.as_str()).collect();
    let top_counts: Vec<i64> = summary.top_urls.iter().map(|u| u.visit_count).collect();

    Ok(render_page(
        cfg,
        "visit-tracker",
        json!({
            "daily_count": summary.today,
            "weekly_count": summary.weekly,
            "monthly_count": summary.monthly,
            "weekly_visits": summary.last7days,
            "monthly_visits": summary.last30days,
            "top_urls": top_urls,
            "top_counts": top_counts,
        }),
        Meta::new(
            format!("Visitor Analytics | {}", cfg.site.name),
            "Visit statistics and page popularity.",
        ),
    ))
}

// ── Fallback ───────────────────────────────────────────

#[get("/<_..>", rank = 20)]
pub fn fallback(cfg: &State<AppConfig>) -> (Status, Template) {
    (Status::NotFound, default_page(cfg, json!({})))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        home,
        movies,
        webseries,
        by_genre,
        search,
        movie_detail,
        webseries_detail,
        about,
        contact,
        privacy,
        visit_dashboard,
        fallback,
    ]
}
