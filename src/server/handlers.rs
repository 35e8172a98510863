//! Route handlers
//!
//! Model-scoped routes authenticate first, then check the model against the
//! catalog, then parse the body. Bodies are taken as `Result` so parse
//! failures are reported in the same `{"error": ...}` shape as everything else.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::auth::Owner;
use super::error::ApiError;
use super::AppState;
use crate::metrics;
use crate::quota::{RemainingQuota, ResourceDefinition, SelectRequest, UsageDelta, UsageRecord};

type ApiResult<T> = Result<Json<T>, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

/// Record store failures of `operation` and pass the result through
fn observe<T>(operation: &str, result: crate::error::Result<T>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        metrics::record_store_error(operation, e);
    }
    result.map_err(ApiError::from)
}

pub async fn root() -> &'static str {
    concat!("modelquota ", env!("CARGO_PKG_VERSION"))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics_text() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ResourceDefinition>> {
    Json(state.tracker.catalog().list().to_vec())
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ResourceDefinition> {
    let model = state.tracker.catalog().require(&name)?;
    Ok(Json(model.clone()))
}

pub async fn track(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(name): Path<String>,
    payload: Result<Json<UsageDelta>, JsonRejection>,
) -> ApiResult<UsageRecord> {
    state.tracker.catalog().require(&name)?;
    let delta = body(payload)?;

    let result = state.tracker.track(&owner, &name, delta).await;
    metrics::TRACK_CALLS_TOTAL
        .with_label_values(&[metrics::outcome(&result)])
        .inc();

    let record = observe("track", result)?;
    metrics::TRACKED_REQUESTS_TOTAL
        .with_label_values(&[name.as_str()])
        .inc_by(delta.requests);
    metrics::TRACKED_TOKENS_TOTAL
        .with_label_values(&[name.as_str()])
        .inc_by(delta.tokens);

    debug!(
        owner = %owner,
        model = %name,
        requests = delta.requests,
        tokens = delta.tokens,
        "usage tracked"
    );
    Ok(Json(record))
}

pub async fn get_usage(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(name): Path<String>,
) -> ApiResult<UsageRecord> {
    state.tracker.catalog().require(&name)?;
    let record = observe("get_usage", state.tracker.get_usage(&owner, &name).await)?;
    Ok(Json(record))
}

pub async fn delete_usage(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(name): Path<String>,
) -> ApiResult<Value> {
    state.tracker.catalog().require(&name)?;
    observe("delete_usage", state.tracker.delete_usage(&owner, &name).await)?;
    debug!(owner = %owner, model = %name, "usage deleted");
    Ok(success())
}

pub async fn remaining(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(name): Path<String>,
) -> ApiResult<RemainingQuota> {
    state.tracker.catalog().require(&name)?;
    let left = observe("remaining", state.tracker.remaining(&owner, &name).await)?;
    metrics::REMAINING_QUERIES_TOTAL
        .with_label_values(&[name.as_str()])
        .inc();
    Ok(Json(left))
}

pub async fn list_usages(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Json<Vec<UsageRecord>> {
    Json(state.tracker.list_usages(&owner).await)
}

/// Query of `DELETE /me`
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Comma-separated model names; everything when absent
    pub models: Option<String>,
}

impl DeleteQuery {
    fn names(&self) -> Option<Vec<String>> {
        self.models.as_ref().map(|models| {
            models
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

pub async fn delete_usages(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Value> {
    match query.names() {
        Some(names) => {
            observe("delete_usages", state.tracker.delete_usages(&owner, &names).await)?;
            debug!(owner = %owner, models = names.len(), "usages deleted");
        }
        None => {
            observe("delete_all_usages", state.tracker.delete_all_usages(&owner).await)?;
            debug!(owner = %owner, "all usages deleted");
        }
    }
    Ok(success())
}

pub async fn select(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: Result<Json<SelectRequest>, JsonRejection>,
) -> ApiResult<Vec<RemainingQuota>> {
    let request = body(payload)?;

    let result = state.tracker.select(&owner, &request).await;
    metrics::SELECT_CALLS_TOTAL
        .with_label_values(&[metrics::outcome(&result)])
        .inc();

    let selected = observe("select", result)?;
    metrics::SELECTED_MODELS.observe(selected.len() as f64);
    Ok(Json(selected))
}
