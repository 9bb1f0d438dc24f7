mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};

use callbridge::core::transfer::TransferInstruction;

use common::{CALLER, REPRESENTATIVE, app, config};

fn json_post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app(config(false));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "OK");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_queue_snapshot_lists_held_callers() {
    let app = app(config(false));

    let request = Request::builder().uri("/queue").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["length"], 0);

    // Escalate a call, then let the dial go unanswered.
    app.post_form("/voice/incoming", &[("CallSid", "CA1"), ("From", CALLER)])
        .await;
    app.post_form("/voice/gather", &[("CallSid", "CA1"), ("Digits", "0")])
        .await;
    app.post_form(
        "/voice/transfer/status",
        &[("CallSid", "CA1"), ("DialCallStatus", "no-answer")],
    )
    .await;

    let request = Request::builder().uri("/queue").body(Body::empty()).unwrap();
    let (_, body) = app.send(request).await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["length"], 1);
    assert_eq!(json["callers"][0]["call_id"], "CA1");
}

#[tokio::test]
async fn test_dequeue_with_empty_queue_is_not_found() {
    let app = app(config(false));

    let (status, body) = app.send(json_post("/queue/dequeue", json!({}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "No caller is waiting");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_dequeue_rejects_invalid_representative() {
    let app = app(config(false));

    let (status, _) = app
        .send(json_post(
            "/queue/dequeue",
            json!({"representative": "not a number"}),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dequeue_redirects_held_markup_call() {
    let app = app(config(false));
    app.post_form("/voice/incoming", &[("CallSid", "CA7"), ("From", CALLER)])
        .await;
    app.post_form("/voice/gather", &[("CallSid", "CA7"), ("Digits", "0")])
        .await;
    let held = app
        .state
        .transfers
        .on_dial_result("CA7", callbridge::core::transfer::DialStatus::Busy);
    assert_eq!(held, TransferInstruction::Hold { position: 1 });

    let (status, body) = app.send(json_post("/queue/dequeue", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["call_id"], "CA7");
    assert_eq!(json["redirected"], true);
    assert_eq!(
        app.call_control.redirects(),
        vec![(
            "CA7".to_string(),
            "https://calls.example.com/voice/transfer".to_string()
        )]
    );
    assert_eq!(
        app.state.store.get_intent("CA7").unwrap().target.as_deref(),
        Some(REPRESENTATIVE)
    );
}
