use axum::{extract::State, routing::get, Json, Router};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{ScanQuotaResponse, SummaryResponse},
    repo::User,
    services::HistoryEntry,
};
use crate::{
    auth::AuthUser,
    deadline::within,
    error::{AppError, AppResult},
    food::quota::displayed,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/me/summary", get(summary))
        .route("/me/history", get(history))
        .route("/me/scan-quota", get(scan_quota))
}

async fn load_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    within(
        state.config.timeouts.db,
        "find user",
        state.users.find_user(user_id),
    )
    .await
    .map_err(AppError::persistence)?
    .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
}

#[instrument(skip(state))]
pub async fn me(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> AppResult<Json<User>> {
    Ok(Json(load_user(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<SummaryResponse>> {
    let user = load_user(&state, user_id).await?;
    let totals = state
        .nutrition
        .daily_summary(user_id, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(SummaryResponse {
        name: user.name,
        calories: totals.calories,
        protein: totals.protein,
        sugar: totals.sugar,
    }))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.nutrition.history(user_id).await?))
}

#[instrument(skip(state))]
pub async fn scan_quota(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ScanQuotaResponse>> {
    let remaining = state
        .scans
        .quota()
        .remaining(user_id, OffsetDateTime::now_utc())
        .await
        .map_err(AppError::persistence)?;
    Ok(Json(ScanQuotaResponse {
        scan_quota: displayed(remaining),
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::build_app,
        auth::jwt::{sign_for_tests, TokenKind},
        config::AppConfig,
        testing::today_noon,
    };

    fn get(uri: &str, user: Uuid) -> Request<Body> {
        let token = sign_for_tests(&AppConfig::test_default().jwt, user, TokenKind::Access);
        Request::get(uri)
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn call(state: AppState, req: Request<Body>) -> (StatusCode, Value) {
        let res = build_app(state).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn summary_for_user_without_meals_is_zero() {
        let (state, store, _) = AppState::fake();
        let user = store.add_user("Rina");

        let (status, body) = call(state, get("/api/v1/me/summary", user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"name": "Rina", "calories": 0.0, "protein": 0.0, "sugar": 0.0})
        );
    }

    #[tokio::test]
    async fn summary_sums_todays_meals() {
        let (state, store, _) = AppState::fake();
        let user = store.add_user("Budi");
        let rice = store.add_food("Rice", "B", &[], 130.125);
        let egg = store.add_food("Egg", "A", &[], 77.5);
        let noon = today_noon();
        store.add_history_at(user, rice, Some(4), noon);
        store.add_history_at(user, egg, None, noon);

        let (status, body) = call(state, get("/api/v1/me/summary", user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calories"], 207.63);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (state, _, _) = AppState::fake();
        let (status, body) = call(state, get("/api/v1/me", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn scan_quota_never_shows_negative() {
        let (state, store, _) = AppState::fake();
        let user = store.add_user("Sari");
        store.add_scans(user, 7, today_noon());

        let (status, body) = call(state, get("/api/v1/me/scan-quota", user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"scan_quota": 0}));
    }

    #[tokio::test]
    async fn history_lists_newest_first_with_tag_names() {
        let (state, store, _) = AppState::fake();
        let user = store.add_user("Tono");
        store.add_group(1, "Fruit");
        let apple = store.add_food("Apple", "A", &[1], 52.0);
        let soup = store.add_food("Soup", "B", &[], 80.0);
        let noon = today_noon();
        store.add_history_at(user, apple, Some(5), noon - time::Duration::hours(2));
        store.add_history_at(user, soup, None, noon);

        let (status, body) = call(state, get("/api/v1/me/history", user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Soup");
        assert_eq!(body[1]["tags"], json!(["Fruit"]));
        assert_eq!(body[1]["rating"], 5);
    }
}
