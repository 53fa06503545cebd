// HTTP request handlers
use crate::application::charging_service::ServiceError;
use crate::domain::policy::UserSettings;
use crate::domain::telemetry::StatisticsRange;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct KwRequest {
    pub kw: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseQuery {
    pub pause_charging: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    pub hours: Option<i64>,
    pub offset_hours: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeFrameQuery {
    pub day_from: NaiveDate,
    pub day_to: NaiveDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsQuery {
    pub reference_date: NaiveDate,
    pub range: StatisticsRange,
}

/// Upper bound for both `hours` and `offsetHours` of the price query
const MAX_PRICE_HOURS: i64 = 48;

impl PriceQuery {
    fn window(&self) -> Result<(i64, i64), ApiError> {
        let hours = self.hours.unwrap_or(5);
        let offset_hours = self.offset_hours.unwrap_or(1);
        for (name, value) in [("hours", hours), ("offsetHours", offset_hours)] {
            if !(0..=MAX_PRICE_HOURS).contains(&value) {
                return Err(ApiError::bad_request(format!(
                    "{name} must be between 0 and {MAX_PRICE_HOURS}, got {value}"
                )));
            }
        }
        Ok((hours, offset_hours))
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn unavailable(what: &str) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: format!("{what} unavailable"),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let status = match &error {
            ServiceError::UnknownUser(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidSettings(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "request failed: {}", self.message);
        } else {
            tracing::warn!(status = %self.status, "request rejected: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

async fn ok_json<T: Serialize>(headers: &HeaderMap, data: &T) -> Response {
    match json_response(StatusCode::OK, data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn respond<T: Serialize>(headers: &HeaderMap, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => ok_json(headers, &data).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current status snapshot and charging suggestion
pub async fn charging_info(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let result = state.charging_service.charging_info(&user, local_now()).await;
    respond(&headers, result).await
}

pub async fn set_charging_speed(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<KwRequest>,
) -> Response {
    let result = state
        .charging_service
        .set_charging_speed(&user, request.kw)
        .await;
    respond(&headers, result).await
}

pub async fn charge_to_suggestion(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<KwRequest>,
) -> Response {
    let result = state
        .charging_service
        .charge_to_suggestion(&user, request.kw, local_now())
        .await;
    respond(&headers, result).await
}

pub async fn apply_suggestion(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let result = state
        .charging_service
        .apply_suggestion(&user, local_now())
        .await;
    respond(&headers, result).await
}

/// Deadline-bound force charging plan
pub async fn calculation(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let result = state
        .charging_service
        .schedule_suggestion(&user, local_now())
        .await;
    respond(&headers, result).await
}

pub async fn inverter_realtime(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.charging_service.inverter_realtime(&user).await {
        Ok(Some(reading)) => ok_json(&headers, &reading).await,
        Ok(None) => ApiError::unavailable("inverter data").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Inverter readings recorded between `dayFrom` and `dayTo`
pub async fn inverter_time_frame(
    Path(user): Path<String>,
    Query(query): Query<TimeFrameQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if query.day_from > query.day_to {
        return ApiError::bad_request(format!(
            "dayFrom {} is after dayTo {}",
            query.day_from, query.day_to
        ))
        .into_response();
    }
    match state
        .charging_service
        .inverter_time_frame(&user, query.day_from, query.day_to)
        .await
    {
        Ok(Some(readings)) => ok_json(&headers, &readings).await,
        Ok(None) => ApiError::unavailable("inverter history").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn inverter_statistics(
    Path(user): Path<String>,
    Query(query): Query<StatisticsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state
        .charging_service
        .inverter_statistics(&user, query.reference_date, query.range)
        .await
    {
        Ok(Some(statistics)) => ok_json(&headers, &statistics).await,
        Ok(None) => ApiError::unavailable("inverter statistics").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn wallbox_realtime(
    Path(user): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.charging_service.wallbox_realtime(&user).await {
        Ok(Some(reading)) => ok_json(&headers, &reading).await,
        Ok(None) => ApiError::unavailable("wallbox data").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn save_settings(
    Path(user): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(settings): Json<UserSettings>,
) -> Response {
    match state.charging_service.save_settings(&user, &settings).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn set_pause_charging(
    Path(user): Path<String>,
    Query(query): Query<PauseQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state
        .charging_service
        .set_pause_charging(&user, query.pause_charging)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Hourly market prices around the current hour
pub async fn prices(
    Query(query): Query<PriceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (hours, offset_hours) = match query.window() {
        Ok(window) => window,
        Err(e) => return e.into_response(),
    };
    match state
        .charging_service
        .prices(local_now(), hours, offset_hours)
        .await
    {
        Some(entries) => ok_json(&headers, &entries).await,
        None => ApiError::unavailable("price data").into_response(),
    }
}
