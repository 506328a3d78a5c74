use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, cron_secret_middleware};

use crate::handlers;
use crate::services::{ReminderDispatcher, ReminderRuleEngine, ReminderService};

pub struct ReminderCellState {
    pub config: Arc<AppConfig>,
    pub service: Arc<ReminderService>,
    pub engine: Arc<ReminderRuleEngine>,
    pub dispatcher: Arc<ReminderDispatcher>,
}

pub fn reminder_routes(state: Arc<ReminderCellState>) -> Router {
    // Staff routes
    let protected_routes = Router::new()
        .route("/reminder-rules", get(handlers::list_rules).post(handlers::create_rule))
        .route(
            "/reminder-rules/{rule_id}",
            get(handlers::get_rule)
                .put(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        .route("/reminder-logs", get(handlers::get_logs))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    // Scheduler and reservation-path callbacks
    let system_routes = Router::new()
        .route("/cron/dispatch", post(handlers::run_dispatch))
        .route("/cron/fixed-time-pass", post(handlers::run_fixed_time_pass))
        .route("/hooks/reservation-created", post(handlers::reservation_created))
        .layer(middleware::from_fn_with_state(state.config.clone(), cron_secret_middleware));

    Router::new()
        .merge(protected_routes)
        .merge(system_routes)
        .with_state(state)
}
