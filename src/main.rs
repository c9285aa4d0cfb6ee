mod analysis;
mod app;
mod auth;
mod config;
mod db;
mod deadline;
mod error;
mod food;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod time_window;
mod users;

use crate::{food::reclaim::spawn_reclaimer, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nutriscan=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;

    if let Some(max_age) = state.config.draft_reclaim_after {
        tracing::info!(?max_age, "stale draft reclaimer enabled");
        spawn_reclaimer(state.foods.clone(), state.storage.clone(), max_age);
    }

    app::serve(app::build_app(state)).await
}
