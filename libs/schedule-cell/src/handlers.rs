use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::calendar::MonthKey;
use shared_models::error::AppError;
use shared_utils::extractor::{require_admin, Tenant};

use crate::models::{
    DeleteOverrideQuery, OpenWindowRequest, PutOverrideRequest, PutWeeklyRuleRequest,
    ScheduleQuery, SlotQuery,
};
use crate::router::ScheduleCellState;

#[derive(Debug, Deserialize)]
pub struct SlotRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BookableQuery {
    pub date: NaiveDate,
}

fn parse_month(raw: &str) -> Result<MonthKey, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

// ==============================================================================
// PATIENT-FACING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<ScheduleCellState>>,
    Tenant(tenant): Tenant,
    Path(doctor_id): Path<Uuid>,
    Query(range): Query<SlotRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let query = SlotQuery {
        doctor_id,
        start: range.start,
        end: range.end,
    };
    let slots = state.schedule.list_slots(&tenant, &query).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn get_booking_window(
    State(state): State<Arc<ScheduleCellState>>,
    Tenant(tenant): Tenant,
    Path(month): Path<String>,
) -> Result<Json<Value>, AppError> {
    let month = parse_month(&month)?;
    let status = state.window.get_window(&tenant, month).await?;
    Ok(Json(json!(status)))
}

#[axum::debug_handler]
pub async fn check_bookable(
    State(state): State<Arc<ScheduleCellState>>,
    Tenant(tenant): Tenant,
    Query(query): Query<BookableQuery>,
) -> Result<Json<Value>, AppError> {
    let today = state.clock.today(Utc::now());
    let bookable = state.window.is_date_bookable(&tenant, query.date, today).await?;

    Ok(Json(json!({
        "date": query.date,
        "bookable": bookable
    })))
}

// ==============================================================================
// STAFF HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let bundle = state.schedule.get_schedule(&tenant, &query).await?;
    Ok(Json(json!(bundle)))
}

#[axum::debug_handler]
pub async fn put_weekly_rule(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path((doctor_id, weekday)): Path<(Uuid, u8)>,
    Json(request): Json<PutWeeklyRuleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let rule = state
        .schedule
        .put_weekly_rule(&tenant, doctor_id, weekday, request)
        .await?;
    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn delete_weekly_rule(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path((doctor_id, weekday)): Path<(Uuid, u8)>,
) -> Result<StatusCode, AppError> {
    require_admin(&user)?;
    state.schedule.delete_weekly_rule(&tenant, doctor_id, weekday).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn put_override(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<PutOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let row = state.schedule.put_override(&tenant, doctor_id, date, request).await?;
    Ok(Json(json!(row)))
}

#[axum::debug_handler]
pub async fn delete_override(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Query(query): Query<DeleteOverrideQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let scope = query.scope()?;
    let removed = state.schedule.delete_override(&tenant, doctor_id, date, scope).await?;

    Ok(Json(json!({
        "removed": removed
    })))
}

#[axum::debug_handler]
pub async fn list_open_months(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let months = state.window.list_open_months(&tenant).await?;
    Ok(Json(json!({
        "months": months
    })))
}

#[axum::debug_handler]
pub async fn open_window_early(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path(month): Path<String>,
    Json(request): Json<OpenWindowRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let month = parse_month(&month)?;
    let status = state
        .window
        .open_early(&tenant, month, request.memo, Utc::now())
        .await?;
    Ok(Json(json!(status)))
}

#[axum::debug_handler]
pub async fn revert_window(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Tenant(tenant): Tenant,
    Path(month): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let month = parse_month(&month)?;
    let status = state.window.revert(&tenant, month).await?;
    Ok(Json(json!(status)))
}
