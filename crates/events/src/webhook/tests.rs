use std::collections::VecDeque;
use std::sync::Mutex;

use assert_matches::assert_matches;
use async_trait::async_trait;
use courier_core::retry::ExponentialBackoff;
use courier_core::signing::verify_signature;
use courier_db::models::webhook::CreateWebhook;

use super::*;
use crate::store::MemoryStore;

/// Replays scripted outcomes, then repeats `fallback` forever.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<WebhookResponse, DeliveryError>>>,
    fallback: Result<WebhookResponse, DeliveryError>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl ScriptedTransport {
    fn new(
        script: Vec<Result<WebhookResponse, DeliveryError>>,
        fallback: Result<WebhookResponse, DeliveryError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn always(status: u16) -> Self {
        Self::new(vec![], Ok(response(status)))
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Never answers.
struct HangingTransport;

#[async_trait]
impl WebhookTransport for HangingTransport {
    async fn send(&self, _request: &WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
        std::future::pending().await
    }
}

fn response(status: u16) -> WebhookResponse {
    WebhookResponse {
        status,
        body: format!("status {status}"),
    }
}

async fn register(
    store: &MemoryStore,
    name: &str,
    max_retries: i32,
    retry_delay_seconds: i32,
    secret: Option<&str>,
) -> WebhookConfig {
    store
        .create(&CreateWebhook {
            name: name.into(),
            url: format!("https://{name}.example.com/hook"),
            secret: secret.map(str::to_string),
            events: vec!["quote.accepted".into()],
            is_active: Some(true),
            max_retries: Some(max_retries),
            retry_delay_seconds: Some(retry_delay_seconds),
        })
        .await
        .unwrap()
}

fn dispatcher(
    store: &Arc<MemoryStore>,
    transport: Arc<dyn WebhookTransport>,
    config: WebhookDispatchConfig,
) -> WebhookDispatcher {
    WebhookDispatcher::new(store.clone(), store.clone(), transport, config)
}

fn payload() -> serde_json::Value {
    serde_json::json!({"quote_id": 12, "total": "1500.00"})
}

#[tokio::test(start_paused = true)]
async fn always_failing_endpoint_logs_every_attempt() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "crm", 4, 2, None).await;
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(500)),
        WebhookDispatchConfig::default(),
    );

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), Some(77))
        .await
        .unwrap();

    assert_eq!(report.dispatched, 1);
    let result = &report.results[0];
    assert_eq!(result.status, WebhookStatus::Failed);
    assert_eq!(result.attempts, 4);

    let logs = store.logs_for(webhook.id);
    let attempt_numbers: Vec<i32> = logs.iter().map(|l| l.attempt_number).collect();
    assert_eq!(attempt_numbers, vec![1, 2, 3, 4]);
    assert!(logs.iter().all(|l| !l.success && l.status_code == Some(500)));
    assert!(logs.iter().all(|l| l.notification_id == Some(77)));

    let stored = store.webhook(webhook.id).unwrap();
    assert_eq!(stored.failed_calls, 1);
    assert_eq!(stored.total_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn success_on_second_attempt_after_fixed_delay() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "crm", 3, 2, None).await;
    let transport = Arc::new(ScriptedTransport::new(
        vec![Ok(response(503))],
        Ok(response(200)),
    ));
    let dispatcher = dispatcher(&store, transport, WebhookDispatchConfig::default());

    let started = Instant::now();
    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(report.results[0].status, WebhookStatus::Success);
    assert_eq!(report.results[0].attempts, 2);

    let logs = store.logs_for(webhook.id);
    assert_eq!(logs.len(), 2);
    assert!(!logs[0].success);
    assert!(logs[1].success);

    let stored = store.webhook(webhook.id).unwrap();
    assert_eq!(stored.total_calls, 1);
    assert_eq!(stored.failed_calls, 0);
    assert!(stored.last_triggered_at.is_some());
}

#[tokio::test]
async fn envelope_is_signed_over_exact_bytes() {
    let store = Arc::new(MemoryStore::new());
    register(&store, "signed", 1, 0, Some("whsec_test")).await;
    register(&store, "unsigned", 1, 0, None).await;
    let transport = Arc::new(ScriptedTransport::always(204));
    let dispatcher = dispatcher(&store, transport.clone(), WebhookDispatchConfig::default());

    dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    let requests = transport.requests.lock().unwrap();
    let signed = requests
        .iter()
        .find(|r| r.url.starts_with("https://signed."))
        .unwrap();
    let signature = signed.signature.as_deref().unwrap();
    assert!(verify_signature("whsec_test", &signed.body, signature));
    assert!(!verify_signature("other-secret", &signed.body, signature));

    let envelope: serde_json::Value = serde_json::from_slice(&signed.body).unwrap();
    assert_eq!(envelope["event"], "quote.accepted");
    assert_eq!(envelope["data"], payload());
    assert!(chrono::DateTime::parse_from_rfc3339(envelope["timestamp"].as_str().unwrap()).is_ok());

    let unsigned = requests
        .iter()
        .find(|r| r.url.starts_with("https://unsigned."))
        .unwrap();
    assert!(unsigned.signature.is_none());
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_retried_by_default() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "crm", 3, 1, None).await;
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(404)),
        WebhookDispatchConfig::default(),
    );

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(report.results[0].attempts, 3);
    assert_eq!(store.logs_for(webhook.id).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_stop_when_retry_disabled() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "crm", 3, 1, None).await;
    let config = WebhookDispatchConfig {
        retry_permanent_errors: false,
        ..Default::default()
    };
    let dispatcher = dispatcher(&store, Arc::new(ScriptedTransport::always(404)), config);

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(report.results[0].attempts, 1);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("Endpoint returned HTTP 404")
    );
    assert_eq!(store.webhook(webhook.id).unwrap().failed_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_still_retried_when_permanent_retry_disabled() {
    let store = Arc::new(MemoryStore::new());
    register(&store, "crm", 3, 1, None).await;
    let config = WebhookDispatchConfig {
        retry_permanent_errors: false,
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new(
        vec![Err(DeliveryError::Network("connection reset".into()))],
        Ok(response(200)),
    ));
    let dispatcher = dispatcher(&store, transport, config);

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, WebhookStatus::Success);
    assert_eq!(report.results[0].attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn attempt_timeout_and_overall_deadline_bound_the_loop() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "slow", 10, 0, None).await;
    let config = WebhookDispatchConfig {
        attempt_timeout: Duration::from_secs(10),
        overall_deadline: Duration::from_secs(25),
        ..Default::default()
    };
    let dispatcher = dispatcher(&store, Arc::new(HangingTransport), config);

    let started = Instant::now();
    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(25));
    let result = &report.results[0];
    assert_eq!(result.status, WebhookStatus::Failed);
    assert_eq!(result.attempts, 3);
    assert!(result.error.as_deref().unwrap().contains("deadline"));
    assert_eq!(store.logs_for(webhook.id).len(), 3);
    assert_eq!(store.webhook(webhook.id).unwrap().failed_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_attempt() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "slow", 5, 0, None).await;
    let dispatcher = dispatcher(
        &store,
        Arc::new(HangingTransport),
        WebhookDispatchConfig::default(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = dispatcher
        .dispatch_with_cancel("quote.accepted", &payload(), None, &cancel)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, WebhookStatus::Failed);
    assert_eq!(result.attempts, 1);
    assert!(result.error.as_deref().unwrap().contains("cancelled"));
    let logs = store.logs_for(webhook.id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_message.as_deref(), Some("dispatch cancelled"));
    assert_eq!(store.webhook(webhook.id).unwrap().failed_calls, 1);
}

#[tokio::test]
async fn already_cancelled_dispatch_makes_no_attempt() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "crm", 3, 0, None).await;
    let transport = Arc::new(ScriptedTransport::always(200));
    let dispatcher = dispatcher(&store, transport.clone(), WebhookDispatchConfig::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = dispatcher
        .dispatch_with_cancel("quote.accepted", &payload(), None, &cancel)
        .await
        .unwrap();

    assert_eq!(report.results[0].attempts, 0);
    assert!(transport.requests.lock().unwrap().is_empty());
    assert!(store.logs_for(webhook.id).is_empty());
}

#[tokio::test]
async fn results_follow_registry_order_and_skip_non_subscribers() {
    let store = Arc::new(MemoryStore::new());
    let first = register(&store, "first", 1, 0, None).await;
    let second = register(&store, "second", 1, 0, None).await;
    store
        .create(&CreateWebhook {
            name: "other-event".into(),
            url: "https://other.example.com/hook".into(),
            secret: None,
            events: vec!["quote.rejected".into()],
            is_active: Some(true),
            max_retries: Some(1),
            retry_delay_seconds: Some(0),
        })
        .await
        .unwrap();
    let inactive = register(&store, "inactive", 1, 0, None).await;
    store
        .update(
            inactive.id,
            &courier_db::models::webhook::UpdateWebhook {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let config = WebhookDispatchConfig {
        max_concurrent_webhooks: 1,
        ..Default::default()
    };
    let dispatcher = dispatcher(&store, Arc::new(ScriptedTransport::always(200)), config);
    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    let ids: Vec<DbId> = report.results.iter().map(|r| r.webhook_id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test(start_paused = true)]
async fn exponential_policy_doubles_the_pause() {
    let store = Arc::new(MemoryStore::new());
    register(&store, "crm", 3, 1, None).await;
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(500)),
        WebhookDispatchConfig::default(),
    )
    .with_retry_policy(Arc::new(ExponentialBackoff::default()));

    let started = Instant::now();
    dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    // 1s after attempt 1, 2s after attempt 2.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test]
async fn configuration_error_is_classified_and_logged() {
    let store = Arc::new(MemoryStore::new());
    let webhook = register(&store, "broken", 2, 0, None).await;
    let transport = Arc::new(ScriptedTransport::new(
        vec![Err(DeliveryError::Configuration(
            "relative URL without a base".into(),
        ))],
        Ok(response(200)),
    ));
    let config = WebhookDispatchConfig {
        retry_permanent_errors: false,
        ..Default::default()
    };
    let dispatcher = dispatcher(&store, transport, config);

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_matches!(
        report.results[0].error.as_deref(),
        Some(msg) if msg.contains("Invalid webhook configuration")
    );
    assert_eq!(store.logs_for(webhook.id).len(), 1);
}

#[tokio::test]
async fn no_subscribers_dispatches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(200)),
        WebhookDispatchConfig::default(),
    );

    let report = dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .unwrap();

    assert_eq!(report, DispatchReport::default());
}

#[tokio::test]
async fn store_outage_is_returned() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(200)),
        WebhookDispatchConfig::default(),
    );
    store.set_unavailable(true);

    assert!(dispatcher
        .dispatch("quote.accepted", &payload(), None)
        .await
        .is_err());
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn dispatch_future_is_send() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = dispatcher(
        &store,
        Arc::new(ScriptedTransport::always(200)),
        WebhookDispatchConfig::default(),
    );
    let payload = payload();
    let webhook = register(&store, "crm", 1, 0, None).await;

    let dispatch = dispatcher.dispatch("quote.accepted", &payload, None);
    assert_send(&dispatch);
    dispatch.await.unwrap();

    let single = dispatcher.deliver_one(&webhook, "webhook.test", &payload);
    assert_send(&single);
    single.await;
}

/// Serializer that always fails.
struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refuses to serialize"))
    }
}

#[tokio::test]
async fn unserializable_envelope_is_a_configuration_error() {
    let store = MemoryStore::new();
    let webhook = register(&store, "crm", 1, 0, Some("whsec_abc")).await;

    let err = build_request(&webhook, "quote.accepted", &Unserializable).unwrap_err();
    assert_matches!(&err, DeliveryError::Configuration(msg) if msg.contains("refuses to serialize"));
    assert_eq!(err.class(), ErrorClass::Configuration);

    let request = build_request(&webhook, "quote.accepted", &payload()).unwrap();
    assert!(!request.body.is_empty());
    assert!(verify_signature(
        "whsec_abc",
        &request.body,
        request.signature.as_deref().unwrap()
    ));
}
