use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_models::calendar::ClinicClock;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{BookingWindowGate, ScheduleService};

pub struct ScheduleCellState {
    pub config: Arc<AppConfig>,
    pub schedule: Arc<ScheduleService>,
    pub window: Arc<BookingWindowGate>,
    pub clock: ClinicClock,
}

pub fn schedule_routes(state: Arc<ScheduleCellState>) -> Router {
    // Patient-facing routes, tenant from X-Tenant-Id
    let public_routes = Router::new()
        .route("/doctors/{doctor_id}/slots", get(handlers::list_slots))
        .route("/booking-window/{month}", get(handlers::get_booking_window))
        .route("/bookable", get(handlers::check_bookable));

    // Staff routes
    let protected_routes = Router::new()
        .route("/schedule", get(handlers::get_schedule))
        .route(
            "/doctors/{doctor_id}/weekly-rules/{weekday}",
            put(handlers::put_weekly_rule).delete(handlers::delete_weekly_rule),
        )
        .route(
            "/doctors/{doctor_id}/overrides/{date}",
            put(handlers::put_override).delete(handlers::delete_override),
        )
        .route("/booking-window", get(handlers::list_open_months))
        .route("/booking-window/{month}/open", post(handlers::open_window_early))
        .route("/booking-window/{month}", delete(handlers::revert_window))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
