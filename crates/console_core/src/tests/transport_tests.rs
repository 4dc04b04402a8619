use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::{
    domain::{Direction, WorkbasketId, WorkbasketType},
    error::ErrorCode,
    protocol::{
        FilterCriteria, PageCursor, PageMetadata, Sorting, WorkbasketSortKey, WorkbasketSummary,
        FILTER_DOMAIN, FILTER_NAME_LIKE,
    },
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    workbasket_queries: Arc<Mutex<Vec<Vec<(String, String)>>>>,
}

async fn list_workbaskets(
    State(state): State<BackendState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<WorkbasketPage> {
    state.workbasket_queries.lock().await.push(pairs);
    Json(WorkbasketPage {
        workbaskets: vec![WorkbasketSummary {
            workbasket_id: WorkbasketId::new("WBI:000000000000000000000000000000000900"),
            key: "sort001".to_string(),
            name: "basxet0".to_string(),
            kind: WorkbasketType::Topic,
            domain: "DOMAIN_A".to_string(),
            description: Some("Lorem ipsum".to_string()),
            owner: None,
            marked_for_deletion: false,
        }],
        page: PageMetadata {
            size: 9,
            total_elements: 1,
            total_pages: 1,
            number: 1,
        },
    })
}

async fn search_access_ids(Query(params): Query<HashMap<String, String>>) -> Json<Vec<AccessIdRecord>> {
    let needle = params.get("search-for").cloned().unwrap_or_default();
    let records = vec![
        AccessIdRecord::new("teamlead-1", "Titus Toll"),
        AccessIdRecord::new("user-1-1", "Max Mustermann"),
    ];
    Json(
        records
            .into_iter()
            .filter(|record| record.access_id.contains(&needle))
            .collect(),
    )
}

async fn forbidden_workbaskets() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::FORBIDDEN,
        Json(ApiError::new(ErrorCode::Forbidden, "not an admin")),
    )
}

async fn unavailable_access_ids() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "maintenance window")
}

async fn garbled_workbaskets() -> &'static str {
    "<html>login</html>"
}

async fn spawn_backend() -> anyhow::Result<(String, BackendState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BackendState::default();
    let app = Router::new()
        .route("/kadai/api/v1/workbaskets", get(list_workbaskets))
        .route("/kadai/api/v1/access-ids", get(search_access_ids))
        .route("/broken/v1/workbaskets", get(forbidden_workbaskets))
        .route("/broken/v1/access-ids", get(unavailable_access_ids))
        .route("/garbled/v1/workbaskets", get(garbled_workbaskets))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn api(server_url: &str, root: &str) -> HttpConsoleApi {
    HttpConsoleApi::new(&format!("{server_url}/{root}"), Duration::from_secs(5)).expect("api")
}

#[test]
fn base_url_is_normalised_with_trailing_slash() {
    let api = HttpConsoleApi::new("http://localhost:8080/kadai/api", Duration::from_secs(1))
        .expect("api");
    assert_eq!(api.base_url().as_str(), "http://localhost:8080/kadai/api/");

    let api = HttpConsoleApi::new("http://localhost:8080/kadai/api//", Duration::from_secs(1))
        .expect("api");
    assert_eq!(api.base_url().as_str(), "http://localhost:8080/kadai/api/");
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = HttpConsoleApi::new("not a url", Duration::from_secs(1))
        .err()
        .expect("invalid url");
    assert!(matches!(err, TransportError::InvalidBaseUrl { .. }));
}

#[tokio::test]
async fn workbasket_query_sends_sort_page_and_filter() {
    let (server_url, state) = spawn_backend().await.expect("spawn server");
    let api = api(&server_url, "kadai/api");
    let params = WorkbasketQueryParameters {
        filter: FilterCriteria::for_domain("DOMAIN_A").with(FILTER_NAME_LIKE, ["bas", ""]),
        sort: Sorting::new(WorkbasketSortKey::Key, Direction::Desc),
        page: PageCursor {
            page: 2,
            page_size: 9,
        },
    };

    let page = api.query_workbaskets(&params).await.expect("query");
    assert_eq!(page.workbaskets.len(), 1);
    assert_eq!(page.workbaskets[0].kind, WorkbasketType::Topic);
    assert_eq!(page.page.total_elements, 1);

    let queries = state.workbasket_queries.lock().await;
    let sent = &queries[0];
    for expected in [
        ("sort-by", "key"),
        ("order", "desc"),
        ("page", "2"),
        ("page-size", "9"),
        (FILTER_DOMAIN, "DOMAIN_A"),
        (FILTER_NAME_LIKE, "bas"),
    ] {
        assert!(
            sent.iter()
                .any(|(key, value)| key == expected.0 && value == expected.1),
            "missing {expected:?} in {sent:?}"
        );
    }
    assert_eq!(sent.iter().filter(|(key, _)| key == FILTER_NAME_LIKE).count(), 1);
}

#[tokio::test]
async fn access_id_search_passes_query_text() {
    let (server_url, _) = spawn_backend().await.expect("spawn server");
    let api = api(&server_url, "kadai/api/");

    let records = api.search_for_access_id("teamlead").await.expect("search");
    assert_eq!(records, vec![AccessIdRecord::new("teamlead-1", "Titus Toll")]);
}

#[tokio::test]
async fn structured_error_body_is_preserved() {
    let (server_url, _) = spawn_backend().await.expect("spawn server");
    let api = api(&server_url, "broken");

    let err = api
        .query_workbaskets(&WorkbasketQueryParameters::default())
        .await
        .expect_err("forbidden");
    let transport = err.downcast_ref::<TransportError>().expect("transport error");
    assert_eq!(transport.status(), Some(403));
    match transport {
        TransportError::Api { error, .. } => {
            assert_eq!(error, &ApiError::new(ErrorCode::Forbidden, "not an admin"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn plain_error_body_falls_back_to_status_mapping() {
    let (server_url, _) = spawn_backend().await.expect("spawn server");
    let api = api(&server_url, "broken");

    let err = api.search_for_access_id("x").await.expect_err("unavailable");
    match err.downcast_ref::<TransportError>() {
        Some(TransportError::Api { status, error, .. }) => {
            assert_eq!(*status, 503);
            assert_eq!(error.code, ErrorCode::Internal);
            assert_eq!(error.message, "maintenance window");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let (server_url, _) = spawn_backend().await.expect("spawn server");
    let api = api(&server_url, "garbled");

    let err = api
        .query_workbaskets(&WorkbasketQueryParameters::default())
        .await
        .expect_err("garbled");
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::Decode { endpoint: "v1/workbaskets", .. })
    ));
}
