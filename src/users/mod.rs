use crate::state::AppState;
use axum::Router;

pub mod dto;
mod extractors;
pub mod handlers;
pub mod manager;
pub mod model;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod repo;
pub mod signup;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::signup_routes())
}
