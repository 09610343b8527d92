// src/server/mod.rs

//! HTTP interface for actuators and judgement clients.
//!
//! Handlers are thin: they call into [`crate::service`] and map
//! [`ServiceError`] onto status codes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::service::{JudgementService, ServiceError, TaskService};

pub mod handlers;
pub mod routes;

pub use routes::router;

#[derive(Debug, Clone)]
pub struct AppState {
    pub tasks: TaskService,
    pub judgements: JudgementService,
}

impl AppState {
    pub fn new(tasks: TaskService, judgements: JudgementService) -> Arc<Self> {
        Arc::new(Self { tasks, judgements })
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = ?self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router(state))
        .await
        .context("http server stopped")
}
