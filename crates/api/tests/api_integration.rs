//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use checkout::{CheckoutConfig, InMemoryPaymentGateway, ScriptedAuthorization};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

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
    router: axum::Router,
    gateway: InMemoryPaymentGateway,
}

impl TestApp {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        api::seed_demo_coupons(&store).await.unwrap();
        let gateway = InMemoryPaymentGateway::new();
        let state = api::AppState::new(
            store,
            api::demo_catalog(),
            gateway.clone(),
            CheckoutConfig::default(),
        );
        let router = api::create_app(state, get_metrics_handle());
        Self { router, gateway }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        identity: Option<(&str, Uuid)>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((header, id)) = identity {
            builder = builder.header(header, id.to_string());
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_string(&value).unwrap())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn add_item(&self, identity: (&str, Uuid), product_id: &str, quantity: i64) -> Response {
        self.send(
            "POST",
            "/cart/items",
            Some(identity),
            Some(json!({ "product_id": product_id, "quantity": quantity })),
        )
        .await
    }

    async fn checkout(&self, user: Uuid, body: Value) -> Response {
        self.send("POST", "/checkout", Some(("x-user-id", user)), Some(body))
            .await
    }
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn user(id: Uuid) -> (&'static str, Uuid) {
    ("x-user-id", id)
}

fn guest(id: Uuid) -> (&'static str, Uuid) {
    ("x-guest-id", id)
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let response = app.send("GET", "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "checkout-api");
}

#[tokio::test]
async fn test_add_item_then_get_cart() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let response = app.add_item(user(user_id), "SKU-001", 2).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let item = json_body(response).await;
    assert_eq!(item["quantity"], 2);

    // Same product again merges into the existing line
    let response = app.add_item(user(user_id), "SKU-001", 1).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.send("GET", "/cart", Some(user(user_id)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = json_body(response).await;
    assert_eq!(cart["owner"], format!("user:{user_id}"));
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], "SKU-001");
    assert_eq!(items[0]["quantity"], 3);
}

#[tokio::test]
async fn test_get_cart_without_cart_is_empty() {
    let app = TestApp::new().await;

    let response = app
        .send("GET", "/cart", Some(guest(Uuid::new_v4())), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cart = json_body(response).await;
    assert!(cart["id"].is_null());
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_and_remove_item() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let item = json_body(app.add_item(user(user_id), "SKU-003", 1).await).await;
    let item_id = item["id"].as_str().unwrap().to_string();

    let response = app
        .send(
            "PUT",
            &format!("/cart/items/{item_id}"),
            Some(user(user_id)),
            Some(json!({ "quantity": 5 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["quantity"], 5);

    // Another caller cannot touch the line
    let response = app
        .send(
            "PUT",
            &format!("/cart/items/{item_id}"),
            Some(user(Uuid::new_v4())),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send("DELETE", &format!("/cart/items/{item_id}"), Some(user(user_id)), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Removing again still succeeds
    let response = app
        .send("DELETE", &format!("/cart/items/{item_id}"), Some(user(user_id)), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app.send("GET", "/cart", None, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "unauthenticated");
}

#[tokio::test]
async fn test_malformed_identity_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cart")
                .header("x-user-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["field"], "x-user-id");
}

#[tokio::test]
async fn test_zero_quantity_is_rejected() {
    let app = TestApp::new().await;

    let response = app.add_item(user(Uuid::new_v4()), "SKU-001", 0).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["code"], "invalid_request");
    assert_eq!(json["field"], "quantity");
}

#[tokio::test]
async fn test_checkout_with_coupon_and_payment() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-001", 2).await;

    let response = app
        .checkout(
            user_id,
            json!({
                "attempt_id": Uuid::new_v4(),
                "coupon_code": "WELCOME10",
                "payment_instrument": "tok_visa"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let order = json_body(response).await;
    assert_eq!(order["user_id"], user_id.to_string());
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal_cents"], 3998);
    assert_eq!(order["discount_cents"], 400);
    assert_eq!(order["total_cents"], 3598);
    assert_eq!(order["coupon_code"], "WELCOME10");
    assert_eq!(order["currency"], "USD");
    assert!(order["payment_reference"].as_str().is_some());
    assert_eq!(order["items"][0]["unit_price_cents"], 1999);

    // The cart is emptied
    let cart = json_body(app.send("GET", "/cart", Some(user(user_id)), None).await).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_retry_returns_same_order() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-002", 1).await;
    let body = json!({ "attempt_id": Uuid::new_v4(), "payment_instrument": "tok_visa" });

    let first = json_body(app.checkout(user_id, body.clone()).await).await;
    let response = app.checkout(user_id, body).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let second = json_body(response).await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(app.gateway.authorize_calls(), 1);
}

#[tokio::test]
async fn test_guest_checkout_is_rejected() {
    let app = TestApp::new().await;
    let guest_id = Uuid::new_v4();
    app.add_item(guest(guest_id), "SKU-001", 1).await;

    let response = app
        .send(
            "POST",
            "/checkout",
            Some(guest(guest_id)),
            Some(json!({ "attempt_id": Uuid::new_v4() })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["code"], "guest_checkout");
}

#[tokio::test]
async fn test_empty_cart_checkout_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .checkout(Uuid::new_v4(), json!({ "attempt_id": Uuid::new_v4() }))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["code"], "empty_cart");
}

#[tokio::test]
async fn test_unknown_coupon_points_at_field() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-001", 1).await;

    let response = app
        .checkout(
            user_id,
            json!({ "attempt_id": Uuid::new_v4(), "coupon_code": "NOPE" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["code"], "invalid_coupon");
    assert_eq!(json["field"], "coupon_code");
}

#[tokio::test]
async fn test_declined_payment() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-001", 1).await;
    app.gateway
        .script(ScriptedAuthorization::Decline("insufficient funds".into()));

    let response = app
        .checkout(
            user_id,
            json!({ "attempt_id": Uuid::new_v4(), "payment_instrument": "tok_visa" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let json = json_body(response).await;
    assert_eq!(json["code"], "payment_declined");
    assert_eq!(json["kind"], "declined");

    // No order was placed and the cart is untouched
    let orders = json_body(app.send("GET", "/orders", Some(user(user_id)), None).await).await;
    assert!(orders.as_array().unwrap().is_empty());
    let cart = json_body(app.send("GET", "/cart", Some(user(user_id)), None).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_body_fields_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .checkout(
            Uuid::new_v4(),
            json!({ "attempt_id": Uuid::new_v4(), "total_cents": 1 }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_consolidate_guest_cart() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-001", 1).await;
    app.add_item(guest(guest_id), "SKU-001", 2).await;
    app.add_item(guest(guest_id), "SKU-003", 1).await;

    let response = app
        .send(
            "POST",
            "/cart/consolidate",
            Some(user(user_id)),
            Some(json!({ "guest_id": guest_id })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "merged");
    assert_eq!(json["lines_merged"], 2);

    let cart = json_body(app.send("GET", "/cart", Some(user(user_id)), None).await).await;
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let widget = items.iter().find(|i| i["product_id"] == "SKU-001").unwrap();
    assert_eq!(widget["quantity"], 3);

    // Repeating finds nothing left to merge
    let response = app
        .send(
            "POST",
            "/cart/consolidate",
            Some(user(user_id)),
            Some(json!({ "guest_id": guest_id })),
        )
        .await;
    assert_eq!(json_body(response).await["outcome"], "no_guest_cart");
}

#[tokio::test]
async fn test_consolidate_requires_user() {
    let app = TestApp::new().await;

    let response = app
        .send(
            "POST",
            "/cart/consolidate",
            Some(guest(Uuid::new_v4())),
            Some(json!({ "guest_id": Uuid::new_v4() })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_orders_are_owner_only() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-003", 1).await;
    let order = json_body(
        app.checkout(user_id, json!({ "attempt_id": Uuid::new_v4() }))
            .await,
    )
    .await;
    let order_id = order["id"].as_str().unwrap();

    let response = app
        .send("GET", &format!("/orders/{order_id}"), Some(user(user_id)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["total_cents"], 799);

    let response = app
        .send(
            "GET",
            &format!("/orders/{order_id}"),
            Some(user(Uuid::new_v4())),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let orders = json_body(app.send("GET", "/orders", Some(user(user_id)), None).await).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    app.add_item(user(user_id), "SKU-001", 1).await;
    app.checkout(user_id, json!({ "attempt_id": Uuid::new_v4() }))
        .await;

    let response = app.send("GET", "/metrics", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_attempts_total"));
}
