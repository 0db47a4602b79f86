//! Integration tests for the `/api/v1/internal` invocation endpoints.

mod common;

use std::collections::BTreeSet;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{admin_token, body_json, build_test_app, post_auth, post_json_auth, put_json_auth, service_token};
use courier_core::channels::Channel;
use courier_db::models::notification::NewNotification;
use courier_events::store::NotificationStore;
use serde_json::json;

fn scheduled(user_id: i64) -> NewNotification {
    NewNotification {
        user_id,
        notification_type: "report.ready".into(),
        category: "reports".into(),
        title: "Weekly report".into(),
        message: "Your weekly report is ready".into(),
        metadata: None,
        channels: BTreeSet::from([Channel::InApp, Channel::Email]),
        priority: Default::default(),
        scheduled_for: None,
    }
}

async fn create_webhook(app: &common::TestApp, events: &[&str]) -> i64 {
    let response = post_json_auth(
        &app.router,
        "/api/v1/admin/webhooks",
        &admin_token(),
        json!({
            "name": "CRM sync",
            "url": "https://crm.example.com/hooks/courier",
            "secret": "whsec_test",
            "events": events,
            "max_retries": 1,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn process_queue_dispatches_due_notifications() {
    let app = build_test_app();
    let input = scheduled(7);
    let past = Utc::now() - Duration::minutes(5);
    let stored = NotificationStore::insert(&*app.store, &input, &input.channels, past)
        .await
        .unwrap();

    let response = post_auth(&app.router, "/api/v1/internal/process-queue", &service_token()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["processed"], 1);
    assert_eq!(json["results"][0]["id"], stored.id);
    assert_eq!(json["results"][0]["status"], "delivered");
    assert_eq!(app.email.messages.lock().unwrap().len(), 1);

    // Nothing left on the second pass.
    let json = body_json(
        post_auth(&app.router, "/api/v1/internal/process-queue", &service_token()).await,
    )
    .await;
    assert_eq!(json["processed"], 0);
}

#[tokio::test]
async fn future_notifications_stay_queued() {
    let app = build_test_app();
    let input = scheduled(7);
    let later = Utc::now() + Duration::hours(1);
    NotificationStore::insert(&*app.store, &input, &input.channels, later)
        .await
        .unwrap();

    let json = body_json(
        post_auth(&app.router, "/api/v1/internal/process-queue", &service_token()).await,
    )
    .await;
    assert_eq!(json["processed"], 0);
    assert!(app.email.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn admin_may_trigger_processing() {
    let app = build_test_app();
    let response = post_auth(&app.router, "/api/v1/internal/process-queue", &admin_token()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn send_digests_with_no_subscribers() {
    let app = build_test_app();
    let response = post_auth(&app.router, "/api/v1/internal/send-digests", &service_token()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["digests_sent"], 0);
    assert_eq!(json["results"], json!([]));
}

#[tokio::test]
async fn dispatch_webhook_reaches_subscribers_only() {
    let app = build_test_app();
    let subscribed = create_webhook(&app, &["job.completed"]).await;
    create_webhook(&app, &["job.failed"]).await;

    let response = post_json_auth(
        &app.router,
        "/api/v1/internal/dispatch-webhook",
        &service_token(),
        json!({
            "event_type": "job.completed",
            "payload": { "job_id": 42 },
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["dispatched"], 1);
    assert_eq!(json["results"][0]["webhook_id"], subscribed);
    assert_eq!(json["results"][0]["status"], "success");
    assert_eq!(json["results"][0]["attempts"], 1);

    let requests = app.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].event_type, "job.completed");
    assert!(requests[0].signature.is_some());
}

#[tokio::test]
async fn dispatch_webhook_without_subscribers_is_empty() {
    let app = build_test_app();
    let json = body_json(
        post_json_auth(
            &app.router,
            "/api/v1/internal/dispatch-webhook",
            &service_token(),
            json!({ "event_type": "nobody.listens" }),
        )
        .await,
    )
    .await;

    assert_eq!(json["dispatched"], 0);
    assert!(app.transport.requests().is_empty());
}

#[tokio::test]
async fn dispatch_webhook_requires_event_type() {
    let app = build_test_app();
    let response = post_json_auth(
        &app.router,
        "/api/v1/internal/dispatch-webhook",
        &service_token(),
        json!({ "event_type": "  " }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn recipients_can_be_registered() {
    let app = build_test_app();
    let response = put_json_auth(
        &app.router,
        "/api/v1/internal/recipients/7",
        &service_token(),
        json!({ "email": "ada@example.com", "push_token": "device-token-1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user_id"], 7);
    assert_eq!(json["data"]["email"], "ada@example.com");
    assert_eq!(json["data"]["push_token"], "device-token-1");
}

#[tokio::test]
async fn recipient_with_invalid_email_is_rejected() {
    let app = build_test_app();
    let response = put_json_auth(
        &app.router,
        "/api/v1/internal/recipients/7",
        &service_token(),
        json!({ "email": "not-an-email" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn create_slow_webhook(app: &common::TestApp) -> i64 {
    let response = post_json_auth(
        &app.router,
        "/api/v1/admin/webhooks",
        &admin_token(),
        json!({
            "name": "Slow ERP",
            "url": "https://erp.example.com/hooks",
            "events": ["job.completed"],
            "max_retries": 3,
            "retry_delay_seconds": 20,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

/// Retries spanning longer than the request timeout still finish and are
/// counted once.
#[tokio::test(start_paused = true)]
async fn long_webhook_retries_outlive_the_request_timeout() {
    let app = build_test_app();
    let id = create_slow_webhook(&app).await;
    app.transport.set_status(500);

    let response = post_json_auth(
        &app.router,
        "/api/v1/internal/dispatch-webhook",
        &service_token(),
        json!({ "event_type": "job.completed" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["results"][0]["status"], "failed");
    assert_eq!(json["results"][0]["attempts"], 3);

    assert_eq!(app.store.logs_for(id).len(), 3);
    let webhook = app.store.webhook(id).unwrap();
    assert_eq!(webhook.failed_calls, 1);
    assert_eq!(webhook.total_calls, 0);
}

/// A caller that hangs up mid-dispatch does not cut the retry loop short.
#[tokio::test(start_paused = true)]
async fn abandoned_dispatch_still_records_the_outcome() {
    let app = build_test_app();
    let id = create_slow_webhook(&app).await;
    app.transport.set_status(500);

    let router = app.router.clone();
    let request = tokio::spawn(async move {
        common::send(
            &router,
            Method::POST,
            "/api/v1/internal/dispatch-webhook",
            Some(&service_token()),
            Some(json!({ "event_type": "job.completed" })),
        )
        .await
    });

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    request.abort();
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;

    let attempts: Vec<i32> = app
        .store
        .logs_for(id)
        .iter()
        .map(|l| l.attempt_number)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(app.store.webhook(id).unwrap().failed_calls, 1);
}
