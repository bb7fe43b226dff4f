use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod builder;
pub mod drm;
pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod normalizer;
pub mod provider;
pub mod repository;
pub mod service;
pub mod webhook;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::save_encoding))
        .route("/encode", post(handler::encode))
        .route("/queues/encoding", post(handler::queue_encoding))
        .route("/update-webhook", post(handler::update_webhook))
        .route("/users/{user_id}", get(handler::list_user_encodings))
        .route("/{id}", get(handler::get_encoding))
}
