pub mod dto;
pub mod handlers;
pub mod news;
pub mod quota;
pub mod reclaim;
pub mod recommend;
pub mod repo;
pub mod repo_types;
pub mod save;
pub mod scan;
pub mod services;
pub mod tags;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
