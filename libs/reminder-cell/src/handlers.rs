use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::reservation::Reservation;
use shared_utils::extractor::{require_admin, Tenant};

use crate::models::{LogQuery, ReminderRuleRequest};
use crate::router::ReminderCellState;

// ==============================================================================
// RULE ADMINISTRATION
// ==============================================================================

#[axum::debug_handler]
pub async fn list_rules(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let rules = state.service.list_rules(&tenant).await?;

    Ok(Json(json!({
        "rules": rules,
        "total": rules.len()
    })))
}

#[axum::debug_handler]
pub async fn get_rule(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let rule = state.service.get_rule(&tenant, rule_id).await?;
    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn create_rule(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Json(request): Json<ReminderRuleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;
    let rule = state.service.create_rule(&tenant, request).await?;
    Ok((StatusCode::CREATED, Json(json!(rule))))
}

#[axum::debug_handler]
pub async fn update_rule(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path(rule_id): Path<Uuid>,
    Json(request): Json<ReminderRuleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let rule = state.service.update_rule(&tenant, rule_id, request).await?;
    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn delete_rule(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&user)?;
    state.service.delete_rule(&tenant, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn get_logs(
    State(state): State<Arc<ReminderCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let logs = state.service.logs(&tenant, query.since).await?;
    Ok(Json(json!({
        "logs": logs
    })))
}

// ==============================================================================
// SYSTEM ENDPOINTS (cron secret)
// ==============================================================================

#[axum::debug_handler]
pub async fn run_dispatch(State(state): State<Arc<ReminderCellState>>) -> Result<Json<Value>, AppError> {
    let summary = state.dispatcher.run(Utc::now()).await?;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn run_fixed_time_pass(State(state): State<Arc<ReminderCellState>>) -> Result<Json<Value>, AppError> {
    let summary = state.engine.run_fixed_time_pass(Utc::now()).await?;
    Ok(Json(json!(summary)))
}

/// Called by the reservation path after a booking is committed.
#[axum::debug_handler]
pub async fn reservation_created(
    State(state): State<Arc<ReminderCellState>>,
    Json(reservation): Json<Reservation>,
) -> Result<Json<Value>, AppError> {
    let tenant = reservation.tenant_id.clone();
    let summary = state
        .engine
        .on_reservation_created(&tenant, &reservation, Utc::now())
        .await?;
    Ok(Json(json!(summary)))
}
