//! End-to-end tests of the HTTP surface over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use marketplace_core::document::DocumentStore;
use marketplace_core::pricing::BookingPolicy;
use marketplace_core::types::UserId;
use marketplace_runtime::{Marketplace, MarketplaceEnvironment};
use marketplace_testing::fixtures::Seed;
use marketplace_testing::{InMemoryDocumentStore, ManualClock};
use marketplace_web::{AppState, CORRELATION_ID_HEADER, USER_ID_HEADER, marketplace_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

struct Api {
    app: Router,
    seed: Seed,
}

async fn api() -> Api {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();

    let store = InMemoryDocumentStore::new();
    let seed = Seed::standard();
    seed.install(&store).await.unwrap();

    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let env = MarketplaceEnvironment::new(
        store,
        Arc::new(ManualClock::starting_now()),
        BookingPolicy::default(),
    );
    Api {
        app: marketplace_router(AppState::new(Marketplace::new(env))),
        seed,
    }
}

impl Api {
    async fn send(&self, method: &str, uri: &str, user: Option<UserId>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.raw(method, uri, user, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, json)
    }

    async fn raw(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn book(&self) -> String {
        let (status, booking) = self
            .send(
                "POST",
                "/bookings",
                Some(self.seed.customer.id),
                Some(json!({
                    "serviceId": self.seed.deep_cleaning().id,
                    "date": "2024-06-01",
                    "time": "10:00",
                    "address": "12 Lake Road",
                    "paymentMethod": "upi"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{booking}");
        booking["id"].as_str().unwrap().to_string()
    }

    async fn complete(&self, id: &str) {
        let provider = Some(self.seed.provider.id);
        let (status, _) = self.send("POST", &format!("/bookings/{id}/accept"), provider, None).await;
        assert_eq!(status, StatusCode::OK);
        for next in ["in-progress", "completed"] {
            let (status, body) = self
                .send(
                    "POST",
                    &format!("/bookings/{id}/status"),
                    provider,
                    Some(json!({ "status": next })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(body["status"], next);
        }
    }
}

#[tokio::test]
async fn health_and_disabled_metrics() {
    let api = api().await;
    let (status, body) = api.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = api.send("GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = api.send("GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_callers_are_rejected() {
    let api = api().await;
    let (status, body) = api.send("GET", "/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn checkout_prices_the_booking() {
    let api = api().await;
    let id = api.book().await;

    let (status, booking) = api
        .send("GET", &format!("/bookings/{id}"), Some(api.seed.customer.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["paymentStatus"], "paid");
    assert_eq!(booking["price"], 10_000);
    assert_eq!(booking["serviceFee"], 1_000);
    assert_eq!(booking["total"], 11_000);
    assert_eq!(booking["providerId"], Value::Null);

    // a provider who does not offer the service cannot see it
    let (status, _) = api
        .send("GET", &format!("/bookings/{id}"), Some(api.seed.plumber.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checkout_without_a_date_is_unprocessable() {
    let api = api().await;
    let (status, body) = api
        .send(
            "POST",
            "/bookings",
            Some(api.seed.customer.id),
            Some(json!({
                "serviceId": api.seed.deep_cleaning().id,
                "time": "10:00",
                "address": "12 Lake Road"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn second_provider_loses_the_accept() {
    let api = api().await;
    let id = api.book().await;

    let (status, booking) = api
        .send("POST", &format!("/bookings/{id}/accept"), Some(api.seed.provider.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "upcoming");
    assert_eq!(booking["providerName"], "Ravi");

    let (status, body) = api
        .send("POST", &format!("/bookings/{id}/accept"), Some(api.seed.rival.id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    // re-accepting your own job is a no-op
    let (status, booking) = api
        .send("POST", &format!("/bookings/{id}/accept"), Some(api.seed.provider.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "upcoming");
}

#[tokio::test]
async fn completed_job_flows_into_reviews_and_earnings() {
    let api = api().await;
    let id = api.book().await;
    api.complete(&id).await;

    let (status, body) = api
        .send("POST", &format!("/bookings/{id}/cancel"), Some(api.seed.customer.id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let review = json!({ "rating": 5, "comment": "Spotless" });
    let uri = format!("/bookings/{id}/review");
    let (status, body) = api.send("POST", &uri, Some(api.seed.customer.id), Some(review.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, _) = api.send("POST", &uri, Some(api.seed.customer.id), Some(review)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let provider = api.seed.provider.id;
    let (status, reviews) = api
        .send("GET", &format!("/providers/{provider}/reviews"), Some(api.seed.customer.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviews.as_array().unwrap().len(), 1);

    let (status, summary) = api.send("GET", "/provider/earnings", Some(provider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["revenue"], 10_000);
    assert_eq!(summary["balance"], 10_000);

    let (status, dashboard) = api.send("GET", "/provider/dashboard", Some(provider), None).await;
    assert_eq!(status, StatusCode::OK, "{dashboard}");
}

#[tokio::test]
async fn withdrawals_check_amount_and_balance() {
    let api = api().await;
    let id = api.book().await;
    api.complete(&id).await;
    let provider = Some(api.seed.provider.id);

    let (status, body) = api
        .send("POST", "/provider/withdrawals", provider, Some(json!({ "amount": "abc" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (status, body) = api
        .send("POST", "/provider/withdrawals", provider, Some(json!({ "amount": 500 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_BALANCE");

    let (status, withdrawal) = api
        .send("POST", "/provider/withdrawals", provider, Some(json!({ "amount": "40.50" })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{withdrawal}");
    assert_eq!(withdrawal["amount"], 4_050);

    let (_, summary) = api.send("GET", "/provider/earnings", provider, None).await;
    assert_eq!(summary["balance"], 5_950);

    let (status, list) = api.send("GET", "/provider/withdrawals", provider, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn earnings_report_is_csv() {
    let api = api().await;
    let id = api.book().await;
    api.complete(&id).await;

    let (status, headers, body) = api
        .raw("GET", "/provider/earnings/report", Some(api.seed.provider.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let csv = String::from_utf8(body).unwrap();
    assert!(csv.starts_with("Job ID,Date,Service,Customer,Amount,Fee,Net Earnings"));
    assert!(csv.contains(&id));
}

#[tokio::test]
async fn provider_job_filters() {
    let api = api().await;
    let done = api.book().await;
    api.complete(&done).await;
    let active = api.book().await;
    let provider = Some(api.seed.provider.id);
    api.send("POST", &format!("/bookings/{active}/accept"), provider, None).await;

    let (_, jobs) = api.send("GET", "/provider/jobs", provider, None).await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["id"], active.as_str());

    let (_, jobs) = api.send("GET", "/provider/jobs?filter=completed", provider, None).await;
    assert_eq!(jobs[0]["id"], done.as_str());

    let (_, jobs) = api.send("GET", "/provider/jobs?filter=all", provider, None).await;
    assert_eq!(jobs.as_array().unwrap().len(), 2);

    let (status, _) = api.send("GET", "/admin/bookings", provider, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, all) = api
        .send("GET", "/admin/bookings?status=completed", Some(api.seed.admin.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn open_requests_reach_matching_providers() {
    let api = api().await;
    let id = api.book().await;

    let (_, requests) = api.send("GET", "/provider/requests", Some(api.seed.rival.id), None).await;
    assert_eq!(requests[0]["id"], id.as_str());

    let (_, requests) = api.send("GET", "/provider/requests", Some(api.seed.plumber.id), None).await;
    assert!(requests.as_array().unwrap().is_empty());

    let (status, requests) = api
        .send("GET", "/provider/requests/available", Some(api.seed.rival.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requests.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn registration_and_addresses() {
    let api = api().await;
    let newcomer = UserId::new();

    let (status, _) = api
        .send("POST", "/me", Some(newcomer), Some(json!({ "name": "Root", "role": "admin" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, user) = api
        .send("POST", "/me", Some(newcomer), Some(json!({ "name": "Priya", "role": "customer" })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");
    assert_eq!(user["name"], "Priya");

    let (status, _) = api
        .send("POST", "/me", Some(newcomer), Some(json!({ "name": "Priya", "role": "customer" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let home = json!({ "label": "Home", "line1": "1 Main St", "city": "Pune", "postalCode": "411001" });
    let (status, first) = api.send("POST", "/me/addresses", Some(newcomer), Some(home)).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["isDefault"], true);

    let work = json!({ "label": "Work", "line1": "9 Tech Park", "city": "Pune", "postalCode": "411057" });
    let (_, second) = api.send("POST", "/me/addresses", Some(newcomer), Some(work)).await;
    assert_eq!(second["isDefault"], false);

    let second_id = second["id"].as_str().unwrap();
    let (status, list) = api
        .send("POST", &format!("/me/addresses/{second_id}/default"), Some(newcomer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["id"], second_id);
    assert_eq!(list[0]["isDefault"], true);
    assert_eq!(list[1]["isDefault"], false);

    let (status, _) = api
        .send("DELETE", &format!("/me/addresses/{second_id}"), Some(newcomer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = api.send("GET", "/me/addresses", Some(newcomer), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["isDefault"], true);
}

#[tokio::test]
async fn catalog_is_public() {
    let api = api().await;
    let (status, services) = api.send("GET", "/services?category=Cleaning", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(services.as_array().unwrap().len(), 2);

    let id = api.seed.deep_cleaning().id;
    let (status, providers) = api.send("GET", &format!("/services/{id}/providers"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(providers.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn responses_carry_a_correlation_id() {
    let api = api().await;
    let (_, headers, _) = api.raw("GET", "/health", None, None).await;
    assert!(headers.contains_key(CORRELATION_ID_HEADER));
}
