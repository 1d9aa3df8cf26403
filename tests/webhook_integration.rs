mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{StubTrigger, TriggerOutcome, WEBHOOK_SECRET};

const REPO_URL: &str = "https://github.com/Codertocat/Hello-World";

fn push_payload(git_ref: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "ref": git_ref,
        "before": "0000000000000000000000000000000000000000",
        "after": "6113728f27ae82c7b1a177c8d03f9e96e0adf246",
        "deleted": false,
        "repository": {
            "name": "Hello-World",
            "full_name": "Codertocat/Hello-World",
            "html_url": REPO_URL,
            "clone_url": format!("{REPO_URL}.git"),
            "git_url": "git://github.com/Codertocat/Hello-World.git",
            "ssh_url": "git@github.com:Codertocat/Hello-World.git",
        },
        "pusher": {"name": "Codertocat"},
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Build failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inaccessible_repository_reports_exact_build_failure() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::MissingRepository));
    let env = helpers::test_env(stub.clone(), true).await;
    let pipeline = helpers::seed_pipeline(&env.state, "Pipeline A", REPO_URL).await;

    let body = push_payload("refs/heads/master");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "failed to build pipeline:  repository does not exist\n");
    assert_eq!(stub.calls(), vec![(pipeline.id, Some("master".to_owned()))]);
}

#[tokio::test]
async fn git_probe_against_missing_local_repository_fails_build() {
    let (env, mut queue) = helpers::git_env().await;
    let url = format!("file://{}", env.tmp.path().join("nowhere.git").display());
    helpers::seed_pipeline(&env.state, "local", &url).await;

    let body = serde_json::to_vec(&json!({
        "ref": "refs/heads/main",
        "repository": {"clone_url": url},
    }))
    .unwrap();
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "local-1"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "failed to build pipeline:  repository does not exist\n");
    assert!(queue.try_recv().is_err(), "nothing may be queued");
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_signature_is_forbidden() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;
    helpers::seed_pipeline(&env.state, "Pipeline A", REPO_URL).await;

    let body = push_payload("refs/heads/master");
    let signature = helpers::sign("wrong-secret", &body);
    let (status, _) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn tampered_body_is_forbidden() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;

    let body = push_payload("refs/heads/master");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let tampered = push_payload("refs/heads/evil");
    let (status, _) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &tampered,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_headers_are_bad_request() {
    let env = helpers::test_env(Arc::new(StubTrigger::new(TriggerOutcome::Queued)), true).await;
    let body = push_payload("refs/heads/master");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);

    let (status, _) = helpers::post_hook(&env.app, &[], &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = helpers::post_hook(
        &env.app,
        &[("x-hub-signature", &signature), ("x-github-event", "push")],
        &body,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", "sha1=zz"),
            ("x-github-event", "push"),
            ("x-github-delivery", "1"),
        ],
        &body,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_webhook_secret_is_internal_error() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), false).await;

    let body = push_payload("refs/heads/master");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!text.contains(WEBHOOK_SECRET));
    assert!(stub.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_push_event_is_ignored() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;
    helpers::seed_pipeline(&env.state, "Pipeline A", REPO_URL).await;

    let body = br#"{"zen":"Keep it logically awesome."}"#;
    let signature = helpers::sign(WEBHOOK_SECRET, body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "ping"),
            ("x-github-delivery", "ping-1"),
        ],
        body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["status"], "ignored");
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn unknown_repository_is_ignored() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;
    helpers::seed_pipeline(&env.state, "other", "https://example.com/other/repo").await;

    let body = push_payload("refs/heads/master");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("ignored"));
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn tag_push_is_ignored() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;
    helpers::seed_pipeline(&env.state, "Pipeline A", REPO_URL).await;

    let body = push_payload("refs/tags/v1.0.0");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, _) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "tag-1"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn matching_push_triggers_build() {
    let stub = Arc::new(StubTrigger::new(TriggerOutcome::Queued));
    let env = helpers::test_env(stub.clone(), true).await;
    let pipeline = helpers::seed_pipeline(&env.state, "Pipeline A", REPO_URL).await;

    let body = push_payload("refs/heads/feature/x");
    let signature = helpers::sign(WEBHOOK_SECRET, &body);
    let (status, text) = helpers::post_hook(
        &env.app,
        &[
            ("x-hub-signature", &signature),
            ("x-github-event", "push"),
            ("x-github-delivery", "1234asdf"),
        ],
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["status"], "triggered");
    assert_eq!(json["pipeline_id"], pipeline.id);
    assert_eq!(stub.calls(), vec![(pipeline.id, Some("feature/x".to_owned()))]);
}
