use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{
    error::CarpoolError,
    queue::QueueSnapshot,
    request::{RawRequest, Request},
    state::AppState,
};

/// Body of every response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: Some(data),
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, CarpoolError>;

#[derive(Debug, Default, Deserialize)]
pub struct StatusChange {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Acceptance {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub rider: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendedQueue {
    pub stop: String,
    pub detour: f64,
    pub requests: Vec<Request>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/requests", post(submit_handler))
        .route("/requests/cancel", post(cancel_handler))
        .route("/requests/status", post(status_handler))
        .route("/requests/accept", post(accept_handler))
        .route("/recommend/{destination}", get(recommend_handler))
        .route("/queues", get(queues_handler).delete(clear_all_handler))
        .route("/queues/{stop}", get(queue_handler).delete(clear_handler))
        .with_state(state)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, CarpoolError> {
    payload
        .map(|Json(payload)| payload)
        .map_err(|e| {
            debug!("Rejected payload: {e}");
            CarpoolError::Validation(vec!["body"])
        })
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Envelope<serde_json::Value>> {
    let data = json!({
        "status": "ok",
        "hub": state.graph.hub(),
        "stops": state.graph.stops(),
    });

    Json(Envelope::success(data, "healthy"))
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawRequest>, JsonRejection>,
) -> ApiResult<Request> {
    let raw = body(payload)?;
    let submission = state.lifecycle.submit(&raw).await?;

    Ok(Json(Envelope::success(submission.request, "Request queued")))
}

pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawRequest>, JsonRejection>,
) -> ApiResult<Request> {
    let raw = body(payload)?;
    let request = state.lifecycle.cancel(&raw).await?;

    Ok(Json(Envelope::success(request, "Request cancelled")))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> ApiResult<Option<bool>> {
    let change = body(payload)?;
    let user = change
        .user
        .ok_or_else(|| CarpoolError::Validation(vec!["user"]))?;
    let place = change.place.unwrap_or_default();

    let status = state.lifecycle.change_status(&user, &place).await?;

    Ok(Json(Envelope::success(status, "Status updated")))
}

pub async fn accept_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Acceptance>, JsonRejection>,
) -> ApiResult<Request> {
    let acceptance = body(payload)?;
    let driver = acceptance.driver.unwrap_or_default();
    let rider = acceptance.rider.unwrap_or_default();
    let place = acceptance.place.unwrap_or_default();

    let request = state.lifecycle.accept(&driver, &rider, &place).await?;

    Ok(Json(Envelope::success(request, "Ride matched")))
}

pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Path(destination): Path<String>,
) -> ApiResult<Vec<RecommendedQueue>> {
    let ranked = state.engine.rank(&destination)?;

    let mut queues = Vec::with_capacity(ranked.len());
    for entry in ranked {
        let snapshot = entry.queue.snapshot().await;
        queues.push(RecommendedQueue {
            stop: snapshot.stop,
            detour: entry.detour,
            requests: snapshot.requests,
        });
    }

    Ok(Json(Envelope::success(queues, "Recommendation ready")))
}

pub async fn queues_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<QueueSnapshot>> {
    let queues = state.store.snapshot().await;

    Ok(Json(Envelope::success(queues, "Queues")))
}

pub async fn queue_handler(
    State(state): State<Arc<AppState>>,
    Path(stop): Path<String>,
) -> ApiResult<QueueSnapshot> {
    let queue = state
        .store
        .stop_index(&stop)
        .and_then(|index| state.store.queue(index))
        .map_err(|_| CarpoolError::Validation(vec!["stop"]))?;

    Ok(Json(Envelope::success(queue.snapshot().await, "Queue")))
}

pub async fn clear_all_handler(State(state): State<Arc<AppState>>) -> ApiResult<usize> {
    let cleared = state.store.clear_all().await;

    Ok(Json(Envelope::success(cleared, "Queues cleared")))
}

pub async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Path(stop): Path<String>,
) -> ApiResult<usize> {
    let index = state
        .store
        .stop_index(&stop)
        .map_err(|_| CarpoolError::Validation(vec!["stop"]))?;
    let cleared = state
        .store
        .clear(index)
        .await
        .map_err(|_| CarpoolError::Validation(vec!["stop"]))?;

    Ok(Json(Envelope::success(cleared, "Queue cleared")))
}
