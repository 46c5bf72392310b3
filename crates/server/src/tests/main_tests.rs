use super::*;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::Request,
};
use host_integration::ManualScheduler;
use shared::protocol::{Notice, ServerEvent};
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(60);

struct TestApp {
    router: Router,
    hub: SessionHub,
    scheduler: ManualScheduler,
}

fn test_app() -> TestApp {
    let (events, _) = broadcast::channel(32);
    let hub = SessionHub::new(events);
    let scheduler = ManualScheduler::new();
    let tpa = TeleportService::new(hub.host_services(Arc::new(scheduler.clone())), TIMEOUT);
    let router = build_router(Arc::new(AppState {
        tpa,
        hub: hub.clone(),
    }));
    TestApp {
        router,
        hub,
        scheduler,
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

async fn call(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, body.to_vec())
}

async fn join_as(app: &TestApp, name: &str, x: f64) {
    let (status, _) = call(
        app,
        json_request(
            "POST",
            "/participants",
            serde_json::json!({
                "name": name,
                "location": { "dimension": "overworld", "x": x, "y": 64.0, "z": 0.0 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn send(app: &TestApp, sender: &str, target: &str) -> (StatusCode, Vec<u8>) {
    call(
        app,
        json_request(
            "POST",
            "/tpa/requests",
            serde_json::json!({ "sender": sender, "target": target }),
        ),
    )
    .await
}

async fn accept(app: &TestApp, target: &str, requester: &str) -> (StatusCode, Vec<u8>) {
    call(
        app,
        json_request(
            "POST",
            "/tpa/requests/accept",
            serde_json::json!({ "target": target, "requester": requester }),
        ),
    )
    .await
}

fn error_code(body: &[u8]) -> ErrorCode {
    serde_json::from_slice::<ApiError>(body).expect("api error").code
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app();
    let (status, body) = call(&app, get_request("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn joining_twice_with_same_name_conflicts() {
    let app = test_app();
    join_as(&app, "Alice", 0.0).await;

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/participants",
            serde_json::json!({
                "name": "Alice",
                "location": { "dimension": "overworld", "x": 1.0, "y": 1.0, "z": 1.0 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), ErrorCode::Conflict);

    let (_, body) = call(&app, get_request("/participants")).await;
    let list: ParticipantList = serde_json::from_slice(&body).expect("json");
    assert_eq!(list.participants, vec![ParticipantName::from("Alice")]);
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let app = test_app();
    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/participants",
            serde_json::json!({
                "name": "  ",
                "location": { "dimension": "overworld", "x": 0.0, "y": 0.0, "z": 0.0 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_names_in_request_bodies_are_rejected() {
    let app = test_app();
    join_as(&app, "Alice", 0.0).await;
    let long_name = "x".repeat(MAX_NAME_BYTES + 1);

    let (status, body) = send(&app, "Alice", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::Validation);

    let (status, body) = send(&app, " Alice", "Bob").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::Validation);

    let (status, body) = accept(&app, "Alice", &long_name).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::Validation);

    let (status, body) = accept(&app, "   ", "Alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::Validation);
}

#[tokio::test]
async fn menu_without_participant_origin_is_forbidden() {
    let app = test_app();
    let (status, body) = call(&app, json_request("POST", "/tpa/menu", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), ErrorCode::InvalidOrigin);

    join_as(&app, "Alice", 0.0).await;
    let (status, body) = call(
        &app,
        json_request("POST", "/tpa/menu", serde_json::json!({ "origin": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let menu: MainMenu = serde_json::from_slice(&body).expect("json");
    assert_eq!(menu.choices.len(), 2);
}

#[tokio::test]
async fn send_menu_is_empty_for_lone_participant() {
    let app = test_app();
    join_as(&app, "Alice", 0.0).await;

    let (status, body) = call(&app, get_request("/tpa/send_menu?name=Alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), ErrorCode::NoEligibleTargets);

    join_as(&app, "Bob", 10.0).await;
    let (status, body) = call(&app, get_request("/tpa/send_menu?name=Alice")).await;
    assert_eq!(status, StatusCode::OK);
    let menu: SendMenu = serde_json::from_slice(&body).expect("json");
    assert_eq!(menu.candidates, vec![ParticipantName::from("Bob")]);
}

#[tokio::test]
async fn request_accept_flow_moves_requester() {
    let app = test_app();
    let mut events = app.hub.subscribe();
    join_as(&app, "Alice", 0.0).await;
    join_as(&app, "Bob", 10.0).await;

    let (status, _) = send(&app, "Alice", "Bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "Alice", "Bob").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), ErrorCode::DuplicateRequest);

    let (status, body) = call(&app, get_request("/tpa/requests?name=Bob")).await;
    assert_eq!(status, StatusCode::OK);
    let menu: AcceptMenu = serde_json::from_slice(&body).expect("json");
    assert_eq!(menu.requesters, vec![ParticipantName::from("Alice")]);

    let (status, _) = accept(&app, "Bob", "Alice").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, get_request("/participants/Alice/location")).await;
    assert_eq!(status, StatusCode::OK);
    let location: Location = serde_json::from_slice(&body).expect("json");
    assert_eq!(location.x, 10.0);

    let (status, body) = accept(&app, "Bob", "Alice").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(error_code(&body), ErrorCode::ExpiredRequest);

    let mut received = false;
    while let Ok(event) = events.try_recv() {
        if let ServerEvent::Notice {
            recipient,
            notice: Notice::RequestReceived { requester, .. },
            ..
        } = event
        {
            assert_eq!(recipient.as_str(), "Bob");
            assert_eq!(requester.as_str(), "Alice");
            received = true;
        }
    }
    assert!(received);
}

#[tokio::test]
async fn unanswered_request_expires() {
    let app = test_app();
    join_as(&app, "Alice", 0.0).await;
    join_as(&app, "Bob", 10.0).await;

    let (status, _) = send(&app, "Alice", "Bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.scheduler.advance(TIMEOUT).await, 1);

    let (status, body) = call(&app, get_request("/tpa/requests?name=Bob")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), ErrorCode::NoPendingRequests);
}

#[tokio::test]
async fn leaving_cancels_pending_requests() {
    let app = test_app();
    join_as(&app, "Alice", 0.0).await;
    join_as(&app, "Bob", 10.0).await;
    let (status, _) = send(&app, "Alice", "Bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::delete("/participants/Alice")
        .body(Body::empty())
        .expect("request");
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.scheduler.pending_count(), 0);
    let (status, _) = call(&app, get_request("/tpa/requests?name=Bob")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::delete("/participants/Alice")
        .body(Body::empty())
        .expect("request");
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn moving_unknown_participant_is_not_found() {
    let app = test_app();
    let (status, _) = call(
        &app,
        json_request(
            "PUT",
            "/participants/Ghost/location",
            serde_json::json!({
                "location": { "dimension": "overworld", "x": 0.0, "y": 0.0, "z": 0.0 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
