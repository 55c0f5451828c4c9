use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use relview_adapters::http::HttpViewerBackend;
use relview_core::catalog::{fetch_catalog, CatalogBackend};
use relview_core::relation::RelationKind;
use relview_core::rows::{RowBackend, RowRequest, SortDirection};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Params = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Params)>>>,
}

impl Recorded {
    fn push(&self, path: String, params: Params) {
        self.requests
            .lock()
            .expect("requests lock")
            .push((path, params));
    }

    fn last(&self) -> (String, Params) {
        self.requests
            .lock()
            .expect("requests lock")
            .last()
            .cloned()
            .expect("at least one request")
    }

    fn find(&self, path: &str) -> Params {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .find(|(seen, _)| seen == path)
            .map(|(_, params)| params.clone())
            .expect("request for path")
    }
}

async fn tables(State(recorded): State<Recorded>, Query(params): Query<Params>) -> Json<Value> {
    recorded.push("tables".to_string(), params);
    Json(json!({
        "page": 1,
        "pageSize": 500,
        "total": 2,
        "totalPages": 1,
        "items": [
            {"name": "orders", "columns": ["id", "total"]},
            {"name": "users"}
        ]
    }))
}

async fn views(State(recorded): State<Recorded>, Query(params): Query<Params>) -> Json<Value> {
    recorded.push("views".to_string(), params);
    Json(json!({"page": 1, "pageSize": 500, "items": null}))
}

async fn rows(
    State(recorded): State<Recorded>,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Json<Value> {
    recorded.push(format!("{collection}/{id}"), params);
    Json(json!({
        "page": 3,
        "pageSize": 10,
        "total": 42,
        "totalPages": 5,
        "items": [
            {"zeta": 1, "alpha": "a"},
            {"alpha": "b", "mid": null}
        ]
    }))
}

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server should run");
    });
    format!("http://{addr}")
}

async fn viewer_server() -> (String, Recorded) {
    let recorded = Recorded::default();
    let router = Router::new()
        .route("/api/web-viewer/tables", get(tables))
        .route("/api/web-viewer/views", get(views))
        .route("/api/web-viewer/:collection/:id", get(rows))
        .with_state(recorded.clone());
    (spawn_server(router).await, recorded)
}

fn backend(base_url: &str) -> HttpViewerBackend {
    HttpViewerBackend::new(base_url, Duration::from_secs(5), 500).expect("backend should build")
}

fn row_request(kind: RelationKind, id: &str) -> RowRequest {
    RowRequest {
        kind,
        id: id.to_string(),
        page_index: 0,
        page_size: 10,
        sort_by: None,
        sort_direction: SortDirection::Ascending,
    }
}

#[tokio::test]
async fn catalog_requests_are_sorted_by_name_and_default_missing_fields() {
    let (base_url, recorded) = viewer_server().await;
    let backend = backend(&base_url);

    let catalog = fetch_catalog(&backend).await.expect("catalog should load");

    assert_eq!(catalog.tables.len(), 2);
    assert_eq!(catalog.tables[0].id, "orders");
    assert_eq!(catalog.tables[0].columns, ["id", "total"]);
    assert!(catalog.tables[1].columns.is_empty());
    assert!(catalog.views.is_empty());

    let params = recorded.find("tables");
    assert_eq!(params.get("page").map(String::as_str), Some("1"));
    assert_eq!(params.get("pageSize").map(String::as_str), Some("500"));
    assert_eq!(params.get("sortBy").map(String::as_str), Some("Name"));
    assert_eq!(params.get("sortDir").map(String::as_str), Some("asc"));

    let views = backend.fetch_views().await.expect("views should load");
    assert!(views.is_empty());
}

#[tokio::test]
async fn row_requests_use_one_based_pages_and_encoded_ids() {
    let (base_url, recorded) = viewer_server().await;
    let backend = backend(&base_url);

    let mut request = row_request(RelationKind::View, "order items/2024");
    request.page_index = 2;
    request.sort_by = Some("total".to_string());
    request.sort_direction = SortDirection::Descending;

    let page = backend.fetch_rows(&request).await.expect("rows should load");

    assert_eq!(page.total_count, 42);
    assert_eq!(page.rows.len(), 2);
    let first_keys: Vec<_> = page.rows[0].keys().cloned().collect();
    assert_eq!(first_keys, ["zeta", "alpha"]);

    let (path, params) = recorded.last();
    assert_eq!(path, "views/order items/2024");
    assert_eq!(params.get("page").map(String::as_str), Some("3"));
    assert_eq!(params.get("pageSize").map(String::as_str), Some("10"));
    assert_eq!(params.get("sortBy").map(String::as_str), Some("total"));
    assert_eq!(params.get("sortDir").map(String::as_str), Some("desc"));
}

#[tokio::test]
async fn blank_sort_column_is_not_sent() {
    let (base_url, recorded) = viewer_server().await;
    let backend = backend(&base_url);

    let mut request = row_request(RelationKind::Table, "orders");
    request.sort_by = Some("   ".to_string());
    backend.fetch_rows(&request).await.expect("rows should load");

    let (path, params) = recorded.last();
    assert_eq!(path, "tables/orders");
    assert!(!params.contains_key("sortBy"));
    assert!(!params.contains_key("sortDir"));
}

#[tokio::test]
async fn error_status_carries_status_and_body() {
    let router = Router::new().route(
        "/api/web-viewer/tables",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database offline") }),
    );
    let base_url = spawn_server(router).await;
    let backend = backend(&base_url);

    let err = backend
        .fetch_tables()
        .await
        .expect_err("500 should fail the fetch");
    let message = err.to_string();
    assert!(message.contains("500"), "unexpected error: {message}");
    assert!(message.contains("database offline"), "unexpected error: {message}");
}

#[tokio::test]
async fn hung_requests_time_out() {
    let router = Router::new().route(
        "/api/web-viewer/:collection/:id",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"items": []}))
        }),
    );
    let base_url = spawn_server(router).await;
    let backend = HttpViewerBackend::new(&base_url, Duration::from_millis(100), 500)
        .expect("backend should build");

    let result = backend
        .fetch_rows(&row_request(RelationKind::Table, "orders"))
        .await;
    assert!(result.is_err());
}
