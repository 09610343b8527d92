// src/server/routes.rs

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::server::{AppState, handlers};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", get(handlers::get_tasks))
        .route("/task/:id", get(handlers::get_task).put(handlers::update_task))
        .route(
            "/task/:id/reservation",
            post(handlers::reserve_task).delete(handlers::unlock_task),
        )
        .route(
            "/judgements",
            get(handlers::list_judgements).post(handlers::create_judgement),
        )
        .route("/judgement/:id", get(handlers::get_judgement))
        .route("/judgement/:id/cancel", post(handlers::cancel_judgement))
        .with_state(state)
}
