// src/server/handlers.rs

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::model::{AccountId, Judgement, JudgementId};
use crate::process::Task;
use crate::server::AppState;
use crate::service::{CreateJudgement, ServiceError, UpdateTask};

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account: AccountId,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub token: String,
    pub epoch: u64,
}

/// GET /tasks?type=T
pub async fn get_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TasksQuery>,
) -> Json<Vec<Task>> {
    Json(state.tasks.get_tasks(&query.kind))
}

/// GET /task/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ServiceError> {
    state.tasks.get_task(&id).map(Json)
}

/// POST /task/:id/reservation
pub async fn reserve_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ServiceError> {
    let r = state.tasks.reserve_task(&id)?;
    Ok(Json(ReservationResponse {
        token: r.token,
        epoch: r.epoch,
    }))
}

/// DELETE /task/:id/reservation?token=TOKEN
pub async fn unlock_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, ServiceError> {
    state.tasks.unlock_task(&id, &query.token)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /task/:id
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTask>,
) -> Result<StatusCode, ServiceError> {
    state.tasks.update_task(&id, body)?;
    Ok(StatusCode::OK)
}

/// POST /judgements
pub async fn create_judgement(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJudgement>,
) -> Result<(StatusCode, Json<Judgement>), ServiceError> {
    let judgement = state.judgements.create_judgement(body).await?;
    Ok((StatusCode::CREATED, Json(judgement)))
}

/// GET /judgements?account=ID
pub async fn list_judgements(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Vec<Judgement>>, ServiceError> {
    state.judgements.list_judgements(query.account).map(Json)
}

/// GET /judgement/:id
pub async fn get_judgement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JudgementId>,
) -> Result<Json<Judgement>, ServiceError> {
    state.judgements.get_judgement(id).map(Json)
}

/// POST /judgement/:id/cancel
pub async fn cancel_judgement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JudgementId>,
) -> Result<Json<Judgement>, ServiceError> {
    state.judgements.cancel_judgement(id).map(Json)
}
