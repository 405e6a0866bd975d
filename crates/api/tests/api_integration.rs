//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Gil, ItemId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::InMemorySagaStore;
use tower::ServiceExt;
use trading::{CatalogItem, CommandKind, TradingConfig};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    state: Arc<api::AppState<InMemorySagaStore>>,
    item_id: ItemId,
}

async fn setup() -> TestApp {
    let (state, _pool) =
        api::create_default_state(InMemorySagaStore::new(), TradingConfig::default());
    let item_id = ItemId::new();
    state
        .catalog
        .add_item(CatalogItem::new(
            item_id,
            "Potion",
            "Restores 50 HP",
            Gil::from_whole(10),
        ))
        .await;
    let app = api::create_app(state.clone(), get_metrics_handle());

    TestApp {
        app,
        state,
        item_id,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn purchase_request(user_id: UserId, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/purchase")
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn status_request(correlation_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/purchase/status/{correlation_id}"))
        .body(Body::empty())
        .unwrap()
}

/// Polls the status endpoint until the purchase reaches `state`.
async fn wait_for_state(app: &axum::Router, correlation_id: &str, state: &str) -> serde_json::Value {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(status_request(correlation_id))
            .await
            .unwrap();
        if response.status() == StatusCode::OK {
            let json = body_json(response).await;
            if json["current_state"] == state {
                return json;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("purchase {correlation_id} never reached {state}");
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_purchase_is_accepted_and_processed() {
    let t = setup().await;
    let user_id = UserId::new();

    let response = t
        .app
        .clone()
        .oneshot(purchase_request(
            user_id,
            serde_json::json!({ "item_id": t.item_id.to_string(), "quantity": 2 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let correlation_id = json["correlation_id"].as_str().unwrap().to_string();

    let status = wait_for_state(&t.app, &correlation_id, "Accepted").await;
    assert_eq!(status["user_id"], user_id.to_string());
    assert_eq!(status["quantity"], 2);
    assert_eq!(status["purchase_total"], "20");
    assert!(status["error_message"].is_null());
    assert_eq!(t.state.bus.count_of(CommandKind::GrantItems).await, 1);
}

#[tokio::test]
async fn test_purchase_with_caller_correlation_id() {
    let t = setup().await;
    let correlation_id = uuid::Uuid::new_v4().to_string();

    let response = t
        .app
        .clone()
        .oneshot(purchase_request(
            UserId::new(),
            serde_json::json!({
                "item_id": t.item_id.to_string(),
                "quantity": 1,
                "correlation_id": correlation_id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["correlation_id"], correlation_id.as_str());
    wait_for_state(&t.app, &correlation_id, "Accepted").await;
}

#[tokio::test]
async fn test_purchase_of_unknown_item_faults() {
    let t = setup().await;
    let unknown = ItemId::new();

    let response = t
        .app
        .clone()
        .oneshot(purchase_request(
            UserId::new(),
            serde_json::json!({ "item_id": unknown.to_string(), "quantity": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let correlation_id = body_json(response).await["correlation_id"]
        .as_str()
        .unwrap()
        .to_string();

    let status = wait_for_state(&t.app, &correlation_id, "Faulted").await;
    assert_eq!(status["error_message"], format!("Unknown item '{unknown}'"));
    assert!(t.state.bus.sent().await.is_empty());
}

#[tokio::test]
async fn test_purchase_rejects_non_positive_quantity() {
    let t = setup().await;

    for quantity in [0, -3] {
        let response = t
            .app
            .clone()
            .oneshot(purchase_request(
                UserId::new(),
                serde_json::json!({ "item_id": t.item_id.to_string(), "quantity": quantity }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Quantity must be positive");
    }
}

#[tokio::test]
async fn test_purchase_requires_user_header() {
    let t = setup().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/purchase")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "item_id": t.item_id.to_string(), "quantity": 1 })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_purchase_rejects_invalid_item_id() {
    let t = setup().await;

    let response = t
        .app
        .oneshot(purchase_request(
            UserId::new(),
            serde_json::json!({ "item_id": "not-a-uuid", "quantity": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_of_unknown_purchase() {
    let t = setup().await;

    let response = t
        .app
        .oneshot(status_request(&uuid::Uuid::new_v4().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_with_invalid_id() {
    let t = setup().await;

    let response = t.app.oneshot(status_request("not-a-uuid")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_store_view() {
    let t = setup().await;
    let user_id = UserId::new();
    t.state.inventory.set_quantity(user_id, t.item_id, 3).await;
    t.state.balances.set_gil(user_id, Gil::from_whole(120)).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/store")
                .header("x-user-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user_gil"], "120");
    assert_eq!(json["items"][0]["name"], "Potion");
    assert_eq!(json["items"][0]["owned_quantity"], 3);
    assert_eq!(json["items"][0]["price"], "10");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
