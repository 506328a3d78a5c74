use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use reminder_cell::*;
use shared_models::calendar::ClinicClock;
use shared_models::tenant::TenantId;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser, TEST_CRON_SECRET};

const TENANT: &str = "clinic-a";

#[derive(Default)]
struct RecordingNotifier {
    pushed: Mutex<Vec<(String, OutboundMessage)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn push(&self, destination_id: &str, message: &OutboundMessage) -> Result<(), ReminderError> {
        self.pushed
            .lock()
            .unwrap()
            .push((destination_id.to_string(), message.clone()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryReminderStore>,
    notifier: Arc<RecordingNotifier>,
}

fn setup() -> TestApp {
    let clock = ClinicClock::from_offset_minutes(540);
    let store = Arc::new(InMemoryReminderStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let state = Arc::new(ReminderCellState {
        config: TestConfig::default().to_arc(),
        service: Arc::new(ReminderService::new(store.clone(), store.clone(), clock)),
        engine: Arc::new(ReminderRuleEngine::new(store.clone(), store.clone(), store.clone(), clock)),
        dispatcher: Arc::new(ReminderDispatcher::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            DispatcherConfig::default(),
        )),
    });

    TestApp {
        router: reminder_routes(state),
        store,
        notifier,
    }
}

fn tenant() -> TenantId {
    TenantId::parse(TENANT).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn as_user(user: &TestUser, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .header("Content-Type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    as_user(&TestUser::admin("staff@clinic.test", TENANT), method, uri, body)
}

fn cron(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", TEST_CRON_SECRET))
        .header("Content-Type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn day_before_rule() -> Value {
    json!({
        "name": "24h before",
        "timing_type": "before_hours",
        "timing_value": 24,
        "message_template": "{patient_name}様 {date} {time} のご予約です"
    })
}

fn reservation_in_days(days: i64) -> Value {
    let date = ClinicClock::from_offset_minutes(540).today(Utc::now()) + Duration::days(days);
    json!({
        "id": Uuid::new_v4(),
        "tenant_id": TENANT,
        "patient_id": Uuid::new_v4(),
        "doctor_id": Uuid::new_v4(),
        "doctor_name": "佐藤",
        "reservation_date": date,
        "reservation_time": "10:00",
        "status": "confirmed",
        "destination_id": "U123"
    })
}

#[tokio::test]
async fn test_rule_crud() {
    let app = setup();

    let (status, rule) = send(&app.router, admin("POST", "/reminder-rules", Some(day_before_rule()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["tenant_id"], TENANT);
    assert_eq!(rule["message_format"], "text");
    assert_eq!(rule["target_day_offset"], 1);
    let rule_id = rule["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, admin("GET", "/reminder-rules", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let mut edited = day_before_rule();
    edited["name"] = json!("Day before (edited)");
    let (status, rule) = send(
        &app.router,
        admin("PUT", &format!("/reminder-rules/{}", rule_id), Some(edited)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rule["name"], "Day before (edited)");

    let (status, _) = send(&app.router, admin("DELETE", &format!("/reminder-rules/{}", rule_id), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app.router, admin("DELETE", &format!("/reminder-rules/{}", rule_id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_unknown_rule_update_is_not_found() {
    let app = setup();
    let (status, _) = send(
        &app.router,
        admin("PUT", &format!("/reminder-rules/{}", Uuid::new_v4()), Some(day_before_rule())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fixed_time_rule_without_send_hour_is_rejected() {
    let app = setup();
    let (status, body) = send(
        &app.router,
        admin(
            "POST",
            "/reminder-rules",
            Some(json!({
                "name": "Evening",
                "timing_type": "fixed_time",
                "message_template": "明日のご予約"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_patients_cannot_manage_rules() {
    let app = setup();
    let patient = TestUser::patient("patient@clinic.test", TENANT);

    let (status, _) = send(&app.router, as_user(&patient, "GET", "/reminder-rules", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cron_routes_require_secret() {
    let app = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/cron/dispatch")
        .header("Authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, summary) = send(&app.router, cron("/cron/dispatch", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["selected"], 0);
}

#[tokio::test]
async fn test_reservation_hook_schedules_once_and_shows_in_logs() {
    let app = setup();
    send(&app.router, admin("POST", "/reminder-rules", Some(day_before_rule()))).await;

    let reservation = reservation_in_days(3);
    let (status, first) = send(
        &app.router,
        cron("/hooks/reservation-created", Some(reservation.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["scheduled"].as_array().unwrap().len(), 1);

    let (_, second) = send(&app.router, cron("/hooks/reservation-created", Some(reservation))).await;
    assert_eq!(second["scheduled"].as_array().unwrap().len(), 0);
    assert_eq!(second["already_scheduled"], 1);

    let messages = app.store.messages(&tenant()).await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.as_deref().unwrap().ends_with("10:00 のご予約です"));

    let (status, body) = send(&app.router, admin("GET", "/reminder-logs", None)).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["rule_name"], "24h before");
    assert_eq!(logs[0]["total"], 1);
    assert_eq!(logs[0]["scheduled"], 1);
}

#[tokio::test]
async fn test_dispatch_sends_due_message() {
    let app = setup();
    send(&app.router, admin("POST", "/reminder-rules", Some(day_before_rule()))).await;
    send(&app.router, cron("/hooks/reservation-created", Some(reservation_in_days(3)))).await;

    let message = app.store.messages(&tenant()).await.remove(0);
    app.store
        .set_patient_name(&tenant(), message.patient_id, "山田花子")
        .await;
    app.store
        .reschedule(message.id, Utc::now() - Duration::minutes(1))
        .await;

    let (status, summary) = send(&app.router, cron("/cron/dispatch", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["sent"], 1);

    let pushed = app.notifier.pushed.lock().unwrap().clone();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].0, "U123");
    match &pushed[0].1 {
        OutboundMessage::Text(text) => assert!(text.starts_with("山田花子様 ")),
        other => panic!("expected a text message, got {:?}", other),
    }

    let (_, body) = send(&app.router, admin("GET", "/reminder-logs", None)).await;
    assert_eq!(body["logs"][0]["sent"], 1);
}

#[tokio::test]
async fn test_fixed_time_pass_endpoint() {
    let app = setup();
    let (status, summary) = send(&app.router, cron("/cron/fixed-time-pass", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["rules"], 0);
    assert_eq!(summary["scheduled"], 0);
}
