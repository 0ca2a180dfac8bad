use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod password;
pub mod repo_types;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::user_routes())
}
