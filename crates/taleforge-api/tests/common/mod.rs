//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use taleforge_api::state::AppState;
use taleforge_core::clock::Clock;
use taleforge_core::memory_store::InMemoryGameStore;
use taleforge_core::model::{Campaign, Character};
use taleforge_core::rng::DeterministicRng;
use taleforge_llm::provider::ProviderAdapter;
use taleforge_test_support::{FixedClock, SequenceRng, seeded_store, single_provider_dispatcher};
use tower::ServiceExt;

/// A seeded in-memory world behind the full router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryGameStore>,
    pub campaign: Campaign,
    pub character: Character,
}

/// Build the app over [`seeded_store`], answering every generation call
/// with `provider` and rolling dice from `rolls`.
pub async fn build_test_app(provider: Arc<dyn ProviderAdapter>, rolls: Vec<u32>) -> TestApp {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> =
        Arc::new(Mutex::new(SequenceRng::new(rolls)));
    let dispatcher = Arc::new(single_provider_dispatcher(provider));
    let state = AppState::new(store.clone(), dispatcher, clock, rng);

    TestApp {
        router: taleforge_api::app(state.clone()),
        state,
        store,
        campaign,
        character,
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
