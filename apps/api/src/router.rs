use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use reminder_cell::{
    reminder_routes, DispatcherConfig, LineNotifier, ReminderCellState, ReminderDispatcher,
    ReminderRuleEngine, ReminderService, SupabaseReminderStore,
};
use schedule_cell::{schedule_routes, BookingWindowGate, ScheduleCellState, ScheduleService, SupabaseScheduleStore};
use shared_config::AppConfig;
use shared_models::calendar::ClinicClock;

pub struct AppServices {
    pub schedule: Arc<ScheduleCellState>,
    pub reminders: Arc<ReminderCellState>,
}

/// Wires both cells to Supabase and the LINE notifier.
pub fn build_services(config: Arc<AppConfig>) -> AppServices {
    let clock = ClinicClock::from_offset_minutes(config.clinic_utc_offset_minutes);

    let schedule_store = Arc::new(SupabaseScheduleStore::new(&config));
    let schedule = Arc::new(ScheduleCellState {
        config: config.clone(),
        schedule: Arc::new(ScheduleService::new(schedule_store.clone())),
        window: Arc::new(BookingWindowGate::new(schedule_store, config.booking_window_days)),
        clock,
    });

    let reminder_store = Arc::new(SupabaseReminderStore::new(&config));
    let dispatcher = ReminderDispatcher::new(
        reminder_store.clone(),
        reminder_store.clone(),
        Arc::new(LineNotifier::new(&config)),
        DispatcherConfig::from_app_config(&config),
    );
    let reminders = Arc::new(ReminderCellState {
        config: config.clone(),
        service: Arc::new(ReminderService::new(reminder_store.clone(), reminder_store.clone(), clock)),
        engine: Arc::new(ReminderRuleEngine::new(
            reminder_store.clone(),
            reminder_store.clone(),
            reminder_store,
            clock,
        )),
        dispatcher: Arc::new(dispatcher),
    });

    AppServices { schedule, reminders }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "clinic-scheduling-api",
        "status": "ok"
    }))
}

pub fn create_router(services: &AppServices) -> Router {
    Router::new()
        .route("/", get(status))
        .nest("/schedule", schedule_routes(services.schedule.clone()))
        .nest("/reminders", reminder_routes(services.reminders.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(&build_services(TestConfig::default().to_arc()))
    }

    #[tokio::test]
    async fn test_status_route() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cells_are_mounted_behind_auth() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/reminders/reminder-rules")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reminders/cron/dispatch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/schedule/booking-window/2030-03")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Patient routes need a tenant before touching the store.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
