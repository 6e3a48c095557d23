mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
};
use callcenter_service::services::providers::mock::{MockAgent, MockFailure};
use common::{test_peer, TestApp, TestOptions};
use serde_json::json;
use std::net::SocketAddr;

#[tokio::test]
async fn create_session_greets_in_requested_language() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/sessions", json!({ "language": "bosnian" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "bosnian");
    assert_eq!(body["agentName"], "Lisa");
    assert!(body["greeting"].as_str().unwrap().starts_with("Zdravo! Ja sam Lisa"));
    assert!(body["sessionId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn create_session_without_body_defaults_to_german() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::POST, "/api/v1/sessions", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "german");
    assert!(body["greeting"].as_str().unwrap().contains("Ich bin Lisa"));
}

#[tokio::test]
async fn unknown_language_falls_back_to_german() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/sessions", json!({ "language": "klingon" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "german");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/sessions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"language\": "))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid JSON body"));
    assert!(app.state.registry.is_empty());
}

#[tokio::test]
async fn chat_round_trip_is_recorded_in_transcript() {
    let app = TestApp::new();
    let id = app.create_session("german").await;

    let (status, body) = app
        .post(
            &format!("/api/v1/sessions/{}/chat", id),
            json!({ "message": "  Was kostet eine Anlage?  " }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(
        body["response"],
        MockAgent::reply_for("Was kostet eine Anlage?")
    );

    let (status, detail) = app.get(&format!("/api/v1/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["messageCount"], 3);

    let messages = detail["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["assistant", "user", "assistant"]);
    assert_eq!(messages[1]["text"], "Was kostet eine Anlage?");
    assert_eq!(app.agent.opened(), 1);
}

#[tokio::test]
async fn conversation_is_opened_once_per_session() {
    let app = TestApp::new();
    let id = app.create_session("serbian").await;

    for message in ["Zdravo", "Koliko košta?", "Hvala"] {
        let (status, _) = app
            .post(
                &format!("/api/v1/sessions/{}/chat", id),
                json!({ "message": message }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(app.agent.opened(), 1);
    assert!(app.agent.instructions()[0].starts_with("Ti si Lisa"));
}

#[tokio::test]
async fn empty_or_missing_message_is_rejected() {
    let app = TestApp::new();
    let id = app.create_session("german").await;
    let uri = format!("/api/v1/sessions/{}/chat", id);

    let (status, body) = app.post(&uri, json!({ "message": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (status, body) = app.post(&uri, json!({ "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (status, body) = app.request(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (_, detail) = app.get(&format!("/api/v1/sessions/{}", id)).await;
    assert_eq!(detail["messageCount"], 1);
    assert_eq!(app.agent.opened(), 0);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/sessions/does-not-exist/chat", json!({ "message": "Hallo" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session not found");

    let (status, _) = app.get("/api/v1/sessions/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_ends_the_session() {
    let app = TestApp::new();
    let id = app.create_session("german").await;
    let uri = format!("/api/v1/sessions/{}", id);

    let (status, body) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Session ended");

    let (status, _) = app.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(&format!("{}/chat", uri), json!({ "message": "Hallo?" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_never_exposes_transcript_text() {
    let app = TestApp::new();
    let first = app.create_session("german").await;
    app.create_session("bosnian").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/sessions/{}/chat", first),
            json!({ "message": "meine geheime Telefonnummer" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/v1/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.get("messages").is_none()));
    assert!(!body.to_string().contains("geheime"));

    let listed = sessions
        .iter()
        .find(|s| s["sessionId"] == first.as_str())
        .unwrap();
    assert_eq!(listed["messageCount"], 3);
    assert_eq!(listed["tier"], "standard");
}

#[tokio::test]
async fn agent_quota_maps_to_429_with_retry_after() {
    let app = TestApp::new();
    let id = app.create_session("german").await;
    app.agent.fail_with(Some(MockFailure::RateLimited));

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/sessions/{}/chat", id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": "Hallo" }).to_string()))
        .unwrap();
    let response = app.respond(request).await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );

    // The caller's message stays on record, the reply does not.
    let (_, detail) = app.get(&format!("/api/v1/sessions/{}", id)).await;
    assert_eq!(detail["messageCount"], 2);
    assert_eq!(detail["messages"][1]["role"], "user");
}

#[tokio::test]
async fn agent_outage_maps_to_503_and_session_survives() {
    let app = TestApp::new();
    let id = app.create_session("german").await;
    let uri = format!("/api/v1/sessions/{}/chat", id);
    app.agent.fail_with(Some(MockFailure::Unavailable));

    let (status, body) = app.post(&uri, json!({ "message": "Hallo" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body["error"].as_str().unwrap().contains("Mock provider"));

    app.agent.fail_with(None);
    let (status, body) = app.post(&uri, json!({ "message": "Nochmal" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], MockAgent::reply_for("Nochmal"));
}

fn list_request(peer: SocketAddr, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/api/v1/sessions");
    if let Some(hop) = forwarded_for {
        builder = builder.header("x-forwarded-for", hop);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_budget() {
    let app = TestApp::with_options(TestOptions {
        rate_limit_max_requests: 2,
        ..TestOptions::default()
    });

    let mut accepted = 0;
    for i in 0..20 {
        let hop = format!("198.51.100.{}", i + 1);
        let (status, _) = app.send(list_request(test_peer(), Some(&hop))).await;
        match status {
            StatusCode::OK => accepted += 1,
            StatusCode::TOO_MANY_REQUESTS => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 2);
    assert_eq!(app.state.rate_limiter.tracked_clients(), 1);
}

#[tokio::test]
async fn rate_limit_answers_429_with_retry_after_per_peer() {
    let app = TestApp::with_options(TestOptions {
        rate_limit_max_requests: 2,
        ..TestOptions::default()
    });

    for _ in 0..2 {
        let (status, _) = app.get("/api/v1/sessions").await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app.respond(list_request(test_peer(), None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Another socket peer has its own budget
    let other = SocketAddr::from(([192, 0, 2, 99], 40000));
    let (status, _) = app.send(list_request(other, None)).await;
    assert_eq!(status, StatusCode::OK);

    // Health probes are not limited
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn trusted_proxy_limits_by_forwarded_client() {
    let app = TestApp::with_options(TestOptions {
        rate_limit_max_requests: 1,
        trust_forwarded_for: true,
        ..TestOptions::default()
    });

    let (status, _) = app
        .send(list_request(test_peer(), Some("203.0.113.7")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(list_request(test_peer(), Some("203.0.113.7, 10.0.0.1")))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = app
        .send(list_request(test_peer(), Some("203.0.113.8")))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.respond(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
}

#[tokio::test]
async fn concurrent_chats_keep_transcripts_apart() {
    let app = TestApp::new();
    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(app.create_session("german").await);
    }

    let requests = ids.iter().flat_map(|id| {
        (0..4).map(move |turn| {
            let uri = format!("/api/v1/sessions/{}/chat", id);
            let message = format!("{}:{}", id, turn);
            (uri, message)
        })
    });
    let results = futures::future::join_all(
        requests.map(|(uri, message)| {
            let app = &app;
            async move { app.post(&uri, json!({ "message": message })).await }
        }),
    )
    .await;
    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));

    for id in &ids {
        let (_, detail) = app.get(&format!("/api/v1/sessions/{}", id)).await;
        let messages = detail["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 9);
        for entry in &messages[1..] {
            let text = entry["text"].as_str().unwrap();
            assert!(text.contains(id.as_str()), "foreign entry {text} in {id}");
        }
    }
}
