#![cfg(test)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rocket::http::{ContentType as Mime, Header, Status};
use rocket::local::blocking::Client;
use rocket_dyn_templates::Template;
use serde_json::Value;
use tempfile::TempDir;

use crate::analytics;
use crate::config::AppConfig;
use crate::db::{init_memory_pool, run_migrations};
use crate::errors::Error;
use crate::models::analytics::Visit;
use crate::models::content::{Content, ContentForm, ContentType, Link, NewLink};
use crate::pagination::{paginate, Page};
use crate::store::flatfile::CsvStore;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::token;

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Fresh SQLite store over a named shared-cache in-memory DB with migrations applied.
fn sqlite_store() -> SqliteStore {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let pool = init_memory_pool(&format!("testdb_{}", id)).expect("Failed to create test pool");
    run_migrations(&pool).expect("Failed to run migrations");
    SqliteStore::new(pool)
}

/// CSV store in a temp dir. Keep the dir alive for as long as the store.
fn csv_store() -> (TempDir, CsvStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = CsvStore::open(dir.path()).expect("csv store");
    (dir, store)
}

fn form(name: &str, genre: &str, content_type: ContentType) -> ContentForm {
    ContentForm {
        name: name.to_string(),
        rating: 7.0,
        genre: genre.to_string(),
        plot_summary: format!("About {}", name),
        release_year: 2020,
        duration: "2h".to_string(),
        content_type: Some(content_type),
        ..Default::default()
    }
}

fn new_link(title: &str) -> NewLink {
    NewLink {
        title: title.to_string(),
        link: format!("https://cdn.example/{}", title),
    }
}

fn names(contents: &[Content]) -> Vec<&str> {
    contents.iter().map(|c| c.name.as_str()).collect()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn visit(store: &dyn Store, url: &str, ts: DateTime<Utc>) {
    store
        .visit_insert(&Visit {
            ip_hash: analytics::hash_ip("203.0.113.7"),
            page_url: url.to_string(),
            user_agent: "test-agent".to_string(),
            timestamp: ts,
        })
        .unwrap();
}

/// Runs a store check once per backend.
macro_rules! on_both_backends {
    ($name:ident, $check:ident) => {
        mod $name {
            #[test]
            fn sqlite() {
                super::$check(&super::sqlite_store());
            }

            #[test]
            fn csv() {
                let (_dir, store) = super::csv_store();
                super::$check(&store);
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════
// Catalogue queries
// ═══════════════════════════════════════════════════════════

fn check_listing_order_and_paging(store: &dyn Store) {
    for (name, t) in [
        ("A", ContentType::Movie),
        ("B", ContentType::Webseries),
        ("C", ContentType::Movie),
        ("D", ContentType::Movie),
    ] {
        store.save(&form(name, "", t)).unwrap();
    }

    assert_eq!(names(&store.list_all(paginate(0, 2)).unwrap()), vec!["D", "C"]);
    assert_eq!(names(&store.list_all(paginate(1, 2)).unwrap()), vec!["B", "A"]);
    assert!(store.list_all(paginate(2, 2)).unwrap().is_empty());

    let movies = store.list_by_type(ContentType::Movie, paginate(0, 10)).unwrap();
    assert_eq!(names(&movies), vec!["D", "C", "A"]);
    assert_eq!(store.count_by_type(ContentType::Movie).unwrap(), 3);
    assert_eq!(store.count_by_type(ContentType::Webseries).unwrap(), 1);
}
on_both_backends!(listing_order_and_paging, check_listing_order_and_paging);

fn check_keyword_and_genre_filters(store: &dyn Store) {
    store.save(&form("The Dark Knight", "Action", ContentType::Movie)).unwrap();
    store.save(&form("Dark", "Thriller, Sci-Fi", ContentType::Webseries)).unwrap();
    store.save(&form("Inception", "Sci-Fi", ContentType::Movie)).unwrap();

    assert_eq!(store.search_by_keyword("DARK", Page::unbounded()).unwrap().len(), 2);
    let dark_movies = store
        .search_by_type_and_keyword(ContentType::Movie, "dark", Page::unbounded())
        .unwrap();
    assert_eq!(names(&dark_movies), vec!["The Dark Knight"]);
    assert_eq!(store.count_by_type_and_keyword(ContentType::Movie, "").unwrap(), 2);
    assert_eq!(store.count_by_type_and_keyword(ContentType::Webseries, "dar").unwrap(), 1);

    let scifi = store.list_by_genre("sci-fi", Page::unbounded()).unwrap();
    assert_eq!(names(&scifi), vec!["Inception", "Dark"]);
    assert_eq!(store.count_by_genre("sci").unwrap(), 2);
    let scifi_series = store
        .list_by_genre_and_type("sci", ContentType::Webseries, Page::unbounded())
        .unwrap();
    assert_eq!(names(&scifi_series), vec!["Dark"]);
    assert_eq!(store.count_by_genre_and_type("sci", ContentType::Movie).unwrap(), 1);

    // LIKE wildcards match literally
    assert!(store.search_by_keyword("%", Page::unbounded()).unwrap().is_empty());
    assert!(store.search_by_keyword("_", Page::unbounded()).unwrap().is_empty());
}
on_both_backends!(keyword_and_genre_filters, check_keyword_and_genre_filters);

fn check_counts_match_unbounded_lists(store: &dyn Store) {
    for i in 0..25 {
        let t = if i % 3 == 0 { ContentType::Webseries } else { ContentType::Movie };
        store.save(&form(&format!("Title {}", i), "Drama", t)).unwrap();
    }
    for t in ContentType::ALL {
        for kw in ["", "title 1", "2"] {
            let listed = store
                .search_by_type_and_keyword(t, kw, Page::unbounded())
                .unwrap()
                .len() as i64;
            assert_eq!(store.count_by_type_and_keyword(t, kw).unwrap(), listed);
        }
    }
    // paging never goes past the last row
    let mut seen = 0;
    for page in 0..10 {
        seen += store.list_all(paginate(page, 4)).unwrap().len();
    }
    assert_eq!(seen, 25);
}
on_both_backends!(counts_match_unbounded_lists, check_counts_match_unbounded_lists);

// ═══════════════════════════════════════════════════════════
// Lookups and links
// ═══════════════════════════════════════════════════════════

fn check_find_and_links(store: &dyn Store) {
    let mut f = form("Stranger Things", "Horror", ContentType::Webseries);
    f.links = vec![new_link("E1"), new_link("E2")];
    let saved = store.save(&f).unwrap();

    let found = store.find_by_id(saved.id).unwrap().unwrap();
    let links = found.links.unwrap();
    assert_eq!(
        links.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
        vec!["E1", "E2"]
    );
    assert!(links.iter().all(|l| l.content_id == saved.id));

    let e3 = store.add_link(saved.id, &new_link("E3")).unwrap();
    let links = store.find_by_id(saved.id).unwrap().unwrap().links.unwrap();
    assert_eq!(links.len(), 3);
    assert!(links.windows(2).all(|w| w[0].id < w[1].id));

    assert!(store
        .find_by_id_and_type(saved.id, ContentType::Movie)
        .unwrap()
        .is_none());
    assert!(store
        .find_by_id_and_type(saved.id, ContentType::Webseries)
        .unwrap()
        .is_some());
    assert!(store.find_by_id(9999).unwrap().is_none());

    assert!(store.add_link(9999, &new_link("X")).unwrap_err().is_not_found());
    assert!(!store.delete_link(saved.id + 1, e3.id).unwrap());
    assert!(store.delete_link(saved.id, e3.id).unwrap());
    assert!(!store.delete_link(saved.id, e3.id).unwrap());
}
on_both_backends!(find_and_links, check_find_and_links);

// ═══════════════════════════════════════════════════════════
// Mutations
// ═══════════════════════════════════════════════════════════

fn check_save_updates_in_place(store: &dyn Store) {
    let saved = store.save(&form("Old Name", "Drama", ContentType::Movie)).unwrap();

    let mut update = ContentForm::from(&saved);
    update.name = "New Name".to_string();
    update.rating = 9.5;
    let updated = store.save(&update).unwrap();
    assert_eq!(updated.id, saved.id);

    let found = store.find_by_id(saved.id).unwrap().unwrap();
    assert_eq!(found.name, "New Name");
    assert_eq!(found.rating, 9.5);
    assert_eq!(found.genre, "Drama");
    assert_eq!(store.list_all(Page::unbounded()).unwrap().len(), 1);

    let mut ghost = update.clone();
    ghost.id = Some(9999);
    assert!(store.save(&ghost).unwrap_err().is_not_found());
}
on_both_backends!(save_updates_in_place, check_save_updates_in_place);

fn check_delete_cascades_and_ids_stay_unique(store: &dyn Store) {
    let mut f = form("Doomed", "", ContentType::Movie);
    f.links = vec![new_link("720p")];
    let doomed = store.save(&f).unwrap();

    assert!(store.delete_by_id(doomed.id).unwrap());
    assert!(store.find_by_id(doomed.id).unwrap().is_none());
    assert!(store.links_for(doomed.id).unwrap().is_empty());
    assert!(!store.delete_by_id(doomed.id).unwrap());

    let next = store.save(&form("Next", "", ContentType::Movie)).unwrap();
    assert!(next.id > doomed.id);
    assert!(store.links_for(next.id).unwrap().is_empty());
}
on_both_backends!(delete_cascades_and_ids_stay_unique, check_delete_cascades_and_ids_stay_unique);

fn check_save_batch_stops_at_first_failure(store: &dyn Store) {
    let batch = vec![
        form("First", "", ContentType::Movie),
        form("", "", ContentType::Movie),
        form("Third", "", ContentType::Movie),
    ];
    let err = store.save_batch(&batch).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(names(&store.list_all(Page::unbounded()).unwrap()), vec!["First"]);

    let ok = store
        .save_batch(&[form("X", "", ContentType::Movie), form("Y", "", ContentType::Webseries)])
        .unwrap();
    assert_eq!(names(&ok), vec!["X", "Y"]);
}
on_both_backends!(save_batch_stops_at_first_failure, check_save_batch_stops_at_first_failure);

// ═══════════════════════════════════════════════════════════
// Visit analytics
// ═══════════════════════════════════════════════════════════

fn check_visit_windows_and_series(store: &dyn Store) {
    let now = at(2026, 10, 16, 12, 0, 0);

    visit(store, "a", at(2026, 10, 16, 1, 0, 0));
    visit(store, "b", at(2026, 10, 15, 23, 59, 59));
    visit(store, "a", at(2026, 10, 13, 8, 0, 0));
    visit(store, "c", at(2026, 10, 11, 8, 0, 0));
    visit(store, "b", at(2026, 10, 9, 13, 0, 0));
    visit(store, "c", at(2026, 10, 9, 11, 0, 0));
    visit(store, "a", at(2026, 9, 20, 10, 0, 0));
    visit(store, "d", at(2026, 9, 10, 10, 0, 0));

    assert_eq!(analytics::today_at(store, now).unwrap(), 1);
    assert_eq!(analytics::weekly_at(store, now).unwrap(), 5);
    assert_eq!(analytics::monthly_at(store, now).unwrap(), 7);

    assert_eq!(
        analytics::daily_series_at(store, 7, now).unwrap(),
        vec![0, 1, 0, 1, 0, 1, 1]
    );

    let month = analytics::daily_series_at(store, 30, now).unwrap();
    assert_eq!(month.len(), 30);
    assert_eq!(month.iter().sum::<i64>(), 7);
    assert_eq!(month[3], 1); // 2026-09-20
    assert_eq!(month[22], 2); // 2026-10-09

    let top = analytics::top_urls(store).unwrap();
    let ranked: Vec<(&str, i64)> = top
        .iter()
        .map(|u| (u.page_url.as_str(), u.visit_count))
        .collect();
    assert_eq!(ranked, vec![("a", 3), ("b", 2), ("c", 2), ("d", 1)]);

    assert_eq!(store.visit_prune_before(&at(2026, 10, 1, 0, 0, 0)).unwrap(), 2);
    assert!(analytics::top_urls(store)
        .unwrap()
        .iter()
        .all(|u| u.page_url != "d"));

    assert_eq!(store.visit_delete_all().unwrap(), 6);
    assert!(analytics::top_urls(store).unwrap().is_empty());
    assert_eq!(analytics::daily_series_at(store, 7, now).unwrap(), vec![0; 7]);
}
on_both_backends!(visit_windows_and_series, check_visit_windows_and_series);

fn check_today_excludes_exact_midnight(store: &dyn Store) {
    let now = at(2026, 3, 1, 9, 0, 0);
    visit(store, "/", at(2026, 3, 1, 0, 0, 0));
    visit(store, "/", at(2026, 3, 1, 0, 0, 1));
    assert_eq!(analytics::today_at(store, now).unwrap(), 1);
    assert_eq!(store.visit_count_since(&at(2026, 3, 1, 0, 0, 0)).unwrap(), 2);
    // the day series buckets by calendar day, so both land on today
    assert_eq!(analytics::daily_series_at(store, 1, now).unwrap(), vec![2]);
}
on_both_backends!(today_excludes_exact_midnight, check_today_excludes_exact_midnight);

fn check_series_zero_fills_gaps(store: &dyn Store) {
    // window is 2026-06-01 ..= 2026-06-07
    let now = at(2026, 6, 7, 18, 30, 0);
    visit(store, "/movies", at(2026, 6, 2, 9, 0, 0));
    visit(store, "/webseries", at(2026, 6, 4, 21, 0, 0));
    visit(store, "/movies", at(2026, 5, 31, 23, 0, 0));

    let week = analytics::daily_series_at(store, 7, now).unwrap();
    assert_eq!(week, vec![0, 1, 0, 1, 0, 0, 0]);
    assert!(week.iter().sum::<i64>() <= analytics::weekly_at(store, now).unwrap());
}
on_both_backends!(series_zero_fills_gaps, check_series_zero_fills_gaps);

#[test]
fn series_of_zero_days_is_empty() {
    let store = sqlite_store();
    assert!(analytics::daily_series_at(&store, 0, Utc::now()).unwrap().is_empty());
}

#[test]
fn record_hashes_the_client_ip() {
    let store = sqlite_store();
    analytics::record(&store, "/movies", "198.51.100.4", "curl/8");
    let visits = crate::models::analytics::Visit::list(&store.pool).unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].ip_hash, analytics::hash_ip("198.51.100.4"));
    assert_ne!(visits[0].ip_hash, "198.51.100.4");
    assert_eq!(visits[0].user_agent, "curl/8");
}

#[test]
fn retention_zero_keeps_everything() {
    let store = sqlite_store();
    visit(&store, "/old", at(2001, 1, 1, 0, 0, 0));
    assert_eq!(analytics::prune(&store, 0).unwrap(), 0);
    assert_eq!(analytics::prune(&store, 30).unwrap(), 1);
}

// ═══════════════════════════════════════════════════════════
// CSV backend specifics
// ═══════════════════════════════════════════════════════════

#[test]
fn csv_changes_survive_reopen() {
    let (dir, store) = csv_store();
    let mut f = form("Persisted", "Drama", ContentType::Movie);
    f.links = vec![new_link("HD")];
    let saved = store.save(&f).unwrap();
    visit(&store, "/persisted", Utc::now());
    drop(store);

    let reopened = CsvStore::open(dir.path()).unwrap();
    let found = reopened.find_by_id(saved.id).unwrap().unwrap();
    assert_eq!(found.name, "Persisted");
    assert_eq!(found.links.unwrap().len(), 1);
    assert_eq!(reopened.visit_top_urls(5).unwrap()[0].page_url, "/persisted");
}

// ═══════════════════════════════════════════════════════════
// HTTP API
// ═══════════════════════════════════════════════════════════

fn client_with(cfg: AppConfig) -> Client {
    let store: Arc<dyn Store> = Arc::new(sqlite_store());
    let rocket = crate::mount_api(rocket::build(), store, cfg)
        .mount("/file", routes![crate::routes::download::getting]);
    Client::tracked(rocket).expect("valid rocket instance")
}

fn client() -> Client {
    client_with(AppConfig::default())
}

const INCEPTION: &str = r#"{
    "name": "Inception",
    "rating": 8.8,
    "genre": "Sci-Fi",
    "plotSummary": "Dreams within dreams",
    "posterUrl": "https://img.example/inception.jpg",
    "releaseYear": 2010,
    "duration": "148 min",
    "type": "MOVIE",
    "links": [{ "title": "1080p", "link": "https://cdn.example/1" }]
}"#;

fn create(client: &Client, body: &str) -> Content {
    let resp = client
        .post("/admin/content")
        .header(Mime::JSON)
        .body(body)
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    resp.into_json::<Content>().unwrap()
}

#[test]
fn admin_test_route() {
    let client = client();
    let resp = client.get("/admin/test").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.into_string().unwrap(), "Admin router works");
}

#[test]
fn admin_content_crud() {
    let client = client();
    let created = create(&client, INCEPTION);
    assert_eq!(created.name, "Inception");
    assert_eq!(created.content_type, ContentType::Movie);

    let resp = client.get(format!("/admin/content/{}", created.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let fetched: Content = resp.into_json().unwrap();
    assert_eq!(fetched.links.unwrap()[0].title, "1080p");

    let resp = client
        .put(format!("/admin/content/{}", created.id))
        .header(Mime::JSON)
        .body(r#"{"rating": 9.1}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let updated: Content = resp.into_json().unwrap();
    assert_eq!(updated.rating, 9.1);
    assert_eq!(updated.name, "Inception");
    assert_eq!(updated.release_year, 2010);

    let resp = client.delete(format!("/admin/content/{}", created.id)).dispatch();
    assert_eq!(resp.status(), Status::NoContent);
    let resp = client.delete(format!("/admin/content/{}", created.id)).dispatch();
    assert_eq!(resp.status(), Status::NotFound);
    let resp = client.get(format!("/admin/content/{}", created.id)).dispatch();
    assert_eq!(resp.status(), Status::NotFound);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["error"], "Content not found");
}

#[test]
fn admin_listing_dispatches_on_filters() {
    let client = client();
    create(&client, INCEPTION);
    create(&client, r#"{"name": "Dark", "genre": "Thriller", "type": "WEBSERIES"}"#);
    create(&client, r#"{"name": "Dark Waters", "genre": "Drama", "type": "MOVIE"}"#);

    let list = |uri: &str| -> Vec<String> {
        let resp = client.get(uri.to_string()).dispatch();
        assert_eq!(resp.status(), Status::Ok, "{}", uri);
        resp.into_json::<Vec<Content>>()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    };

    assert_eq!(list("/admin/content"), vec!["Dark Waters", "Dark", "Inception"]);
    assert_eq!(list("/admin/content?type=WEBSERIES"), vec!["Dark"]);
    assert_eq!(list("/admin/content?keyword=dark"), vec!["Dark Waters", "Dark"]);
    assert_eq!(list("/admin/content?keyword=dark&type=MOVIE"), vec!["Dark Waters"]);
    assert_eq!(list("/admin/content?page=1&size=2"), vec!["Inception"]);
    assert_eq!(list("/admin/content?page=abc&size=xyz").len(), 3);

    let resp = client.get("/admin/content?type=cartoon").dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn admin_bulk_insert() {
    let client = client();
    let resp = client
        .post("/admin/contents/all")
        .header(Mime::JSON)
        .body("[]")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["error"], "No content provided");

    let resp = client
        .post("/admin/contents/all")
        .header(Mime::JSON)
        .body(r#"[{"name": "One", "type": "MOVIE"}, {"name": "Two", "type": "WEBSERIES"}]"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let saved: Vec<Content> = resp.into_json().unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved[0].id < saved[1].id);
}

#[test]
fn admin_rejects_content_without_type() {
    let client = client();
    let resp = client
        .post("/admin/content")
        .header(Mime::JSON)
        .body(r#"{"name": "Nameless type"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn admin_link_routes() {
    let client = client();
    let created = create(&client, INCEPTION);

    let resp = client
        .post(format!("/admin/content/{}/links", created.id))
        .header(Mime::JSON)
        .body(r#"{"title": "720p", "link": "https://cdn.example/2"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    let link: Link = resp.into_json().unwrap();
    assert_eq!(link.content_id, created.id);

    let resp = client
        .post("/admin/content/9999/links")
        .header(Mime::JSON)
        .body(r#"{"title": "x", "link": "y"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::NotFound);

    let uri = format!("/admin/content/{}/links/{}", created.id, link.id);
    assert_eq!(client.delete(uri.clone()).dispatch().status(), Status::NoContent);
    assert_eq!(client.delete(uri).dispatch().status(), Status::NotFound);
}

#[test]
fn admin_token_is_enforced_when_configured() {
    let mut cfg = AppConfig::default();
    cfg.admin.token = "s3cret".to_string();
    let client = client_with(cfg);

    let resp = client.get("/admin/content").dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["error"], "Unauthorized");

    let resp = client
        .get("/admin/content")
        .header(Header::new("X-Admin-Token", "wrong"))
        .dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);

    let resp = client
        .get("/admin/content")
        .header(Header::new("X-Admin-Token", "s3cret"))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn cache_refresh_reports_backend() {
    let client = client();
    let resp = client.post("/admin/cache/refresh").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["backend"], "sqlite");
}

#[test]
fn visit_api_round() {
    let client = client();

    let resp = client
        .post("/visits/track")
        .header(Mime::JSON)
        .body("{}")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["error"], "pageUrl is required");

    for url in ["/movies", "/movies", "/about"] {
        let resp = client
            .post("/visits/track")
            .header(Mime::JSON)
            .header(Header::new("X-Real-IP", "192.0.2.10"))
            .body(format!(r#"{{"pageUrl": "{}"}}"#, url))
            .dispatch();
        assert_eq!(resp.status(), Status::Ok);
    }

    for window in ["today", "weekly", "monthly"] {
        let body: Value = client
            .get(format!("/visits/{}", window))
            .dispatch()
            .into_json()
            .unwrap();
        assert_eq!(body["count"], 3, "{}", window);
    }

    let top: Value = client.get("/visits/top-urls").dispatch().into_json().unwrap();
    assert_eq!(top[0]["page_url"], "/movies");
    assert_eq!(top[0]["visit_count"], 2);

    let week: Vec<i64> = client.get("/visits/last7days").dispatch().into_json().unwrap();
    assert_eq!(week.len(), 7);
    assert_eq!(week[6], 3);
    let month: Vec<i64> = client.get("/visits/last30days").dispatch().into_json().unwrap();
    assert_eq!(month.len(), 30);

    let resp = client.post("/visits/deleteAll").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: Value = client.get("/visits/today").dispatch().into_json().unwrap();
    assert_eq!(body["count"], 0);
}

#[test]
fn track_does_not_depend_on_content_type() {
    let client = client();

    let resp = client
        .post("/visits/track")
        .body(r#"{"pageUrl": "/contact"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = client.post("/visits/track").body("{}").dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    let resp = client
        .post("/visits/track")
        .header(Mime::Plain)
        .body("not json")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    let body: Value = client.get("/visits/today").dispatch().into_json().unwrap();
    assert_eq!(body["count"], 1);
}

#[test]
fn getting_returns_file_link() {
    let mut cfg = AppConfig::default();
    cfg.download.prefix_url = "https://files.example/d/".to_string();
    cfg.download.suffix_url = ".zip".to_string();
    let client = client_with(cfg);

    let resp = client
        .get(format!("/file/getting?token={}", token::encode(42)))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.into_string().unwrap(), "https://files.example/d/42.zip");

    let resp = client.get("/file/getting").dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    assert_eq!(resp.into_string().unwrap(), "Missing token.");

    let resp = client.get("/file/getting?token=%21%21notbase64").dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    assert_eq!(resp.into_string().unwrap(), "Invalid token.");
}

// ═══════════════════════════════════════════════════════════
// Pages
// ═══════════════════════════════════════════════════════════

/// Full site: JSON API plus the rendered public and download pages.
fn client_with_pages(store: Arc<dyn Store>, cfg: AppConfig) -> Client {
    let figment = rocket::Config::figment().merge(("template_dir", crate::boot::TEMPLATE_DIR));
    let rocket = crate::mount_api(rocket::custom(figment), store, cfg)
        .attach(Template::fairing())
        .mount("/file", crate::routes::download::routes())
        .mount("/", crate::routes::public::routes());
    Client::tracked(rocket).expect("valid rocket instance")
}

fn page(client: &Client, uri: &str) -> (Status, String) {
    let resp = client.get(uri.to_string()).dispatch();
    let status = resp.status();
    (status, resp.into_string().unwrap_or_default())
}

fn seeded_site() -> (Arc<dyn Store>, Content) {
    let store: Arc<dyn Store> = Arc::new(sqlite_store());
    let mut inception = form("Inception", "Sci-Fi", ContentType::Movie);
    inception.links = vec![new_link("1080p")];
    let inception = store.save(&inception).unwrap();
    store
        .save(&form("Dark", "Thriller, Sci-Fi", ContentType::Webseries))
        .unwrap();
    for i in 0..5 {
        store
            .save(&form(&format!("Feature {}", i), "Drama", ContentType::Movie))
            .unwrap();
    }
    (store, inception)
}

#[test]
fn listing_pages_render_and_page() {
    let (store, _) = seeded_site();
    let mut cfg = AppConfig::default();
    cfg.site.public_page_size = 2;
    let client = client_with_pages(store, cfg);

    let (status, body) = page(&client, "/");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Feature 4") && body.contains("Feature 3"));
    assert!(!body.contains("Inception"));
    assert!(body.contains("Page 1 of 3"));

    let (status, body) = page(&client, "/movies?page=2");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Inception"));
    assert!(body.contains("Page 3 of 3"));

    let (_, body) = page(&client, "/movies?keyword=inc");
    assert!(body.contains("Inception"));
    assert!(!body.contains("Feature 4"));

    let (status, body) = page(&client, "/webseries");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Dark"));
    assert!(!body.contains("Inception"));

    let (status, body) = page(&client, "/genre/sci-fi");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Sci Fi"));
    assert!(body.contains("Inception") && body.contains("Dark"));

    let (status, body) = page(&client, "/search?keyword=dark");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Dark"));
    assert!(!body.contains("Feature"));

    for uri in ["/about", "/contact", "/privacy"] {
        assert_eq!(page(&client, uri).0, Status::Ok, "{}", uri);
    }
    assert_eq!(page(&client, "/nope/x").0, Status::NotFound);
}

#[test]
fn detail_pages_check_type_and_record_visits() {
    let (store, inception) = seeded_site();
    let client = client_with_pages(Arc::clone(&store), AppConfig::default());

    let (status, body) = page(&client, &format!("/movie/{}/inception", inception.id));
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Inception"));
    assert!(body.contains("1080p"));
    assert!(body.contains("Get download links"));

    let (status, _) = page(&client, &format!("/webseries/{}/x", inception.id));
    assert_eq!(status, Status::NotFound);
    assert_eq!(page(&client, "/movie/9999/x").0, Status::NotFound);

    let top = store.visit_top_urls(10).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].page_url, "movie-detail-Inception");
    assert_eq!(top[0].visit_count, 1);
}

#[test]
fn download_pages_follow_the_token() {
    let (store, inception) = seeded_site();
    let client = client_with_pages(store, AppConfig::default());
    let token = token::encode(inception.id);

    assert_eq!(page(&client, "/file").0, Status::Ok);

    let (status, body) = page(&client, &format!("/file/fetch/{}", token));
    assert_eq!(status, Status::Ok);
    assert!(body.contains("/file/choose/"));

    let (status, body) = page(&client, &format!("/file/choose/{}", token));
    assert_eq!(status, Status::Ok);
    assert!(body.contains("Inception"));
    assert!(body.contains("1080p"));

    assert_eq!(page(&client, "/file/choose/%21%21").0, Status::BadRequest);
    let missing = token::encode(9999);
    assert_eq!(
        page(&client, &format!("/file/choose/{}", missing)).0,
        Status::NotFound
    );
}

#[test]
fn visit_dashboard_renders_counts() {
    let (store, _) = seeded_site();
    analytics::record(store.as_ref(), "homepage", "192.0.2.1", "ua");
    analytics::record(store.as_ref(), "homepage", "192.0.2.2", "ua");
    let client = client_with_pages(store, AppConfig::default());

    let (status, body) = page(&client, "/data/visits");
    assert_eq!(status, Status::Ok);
    assert!(body.contains("homepage"));
}
