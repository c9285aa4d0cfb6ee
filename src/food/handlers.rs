use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use super::{
    dto::{AnalyzeSaveMetadata, DetailQuery, EatFoodRequest, FilterQuery, NewsResponse},
    repo_types::{CatalogQuery, Food},
    save::ImageUpload,
    services::{self, FoodDetail, FoodPage},
};
use crate::{
    analysis::NutritionEstimate,
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    storage::ext_from_mime,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/food/detail", get(get_food_detail))
        .route("/food/news", get(get_news))
        .route("/food/filter", get(list_foods))
        .route("/food/recommendation", get(get_recommendation))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/food/save", post(record_meal))
        .route("/food/analyze", post(analyze_image))
        .route("/food/analyze/save", post(analyze_and_save))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn get_food_detail(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DetailQuery>,
) -> AppResult<Json<FoodDetail>> {
    Ok(Json(services::food_detail(&state, user_id, q.id).await?))
}

#[instrument(skip(state))]
pub async fn get_news(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> AppResult<Json<NewsResponse>> {
    let news = state.news.latest().await.map_err(|e| {
        error!(error = %e, "news feed unavailable");
        AppError::UpstreamFailed(format!("{:#}", e))
    })?;
    Ok(Json(NewsResponse { news }))
}

#[instrument(skip(state))]
pub async fn list_foods(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Query(q): Query<FilterQuery>,
) -> AppResult<Json<FoodPage>> {
    let name = q.name.trim();
    let query = CatalogQuery {
        page: q.page,
        limit: q.limit,
        name: (!name.is_empty()).then(|| name.to_string()),
        tags: services::parse_tags(&q.tags)?,
    };
    Ok(Json(services::list_foods(&state, query).await?))
}

#[instrument(skip(state))]
pub async fn get_recommendation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<Food>>> {
    let foods = state
        .recommender
        .recommend(user_id)
        .await
        .map_err(AppError::persistence)?;
    Ok(Json(foods))
}

/// POST /food/save { food_id, food_rate? }
#[instrument(skip(state))]
pub async fn record_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<EatFoodRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .saves
        .record_meal(user_id, body.food_id, body.food_rate)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /food/analyze (multipart)
/// Field: image
#[instrument(skip(state, mp))]
pub async fn analyze_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> AppResult<Json<NutritionEstimate>> {
    let (image, _) = read_upload(mp).await?;
    let image = image.ok_or_else(|| AppError::ValidationFailed("No file uploaded".into()))?;
    check_image_type(&image)?;

    let estimate = state
        .scans
        .analyze(user_id, image.bytes, &image.content_type)
        .await?;
    Ok(Json(estimate))
}

/// POST /food/analyze/save (multipart)
/// Fields: image, metadata (JSON with the food fields, food_rate?, draft_id?)
#[instrument(skip(state, mp))]
pub async fn analyze_and_save(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> AppResult<impl IntoResponse> {
    let (image, metadata) = read_upload(mp).await?;
    let image = image.ok_or_else(|| AppError::ValidationFailed("No file uploaded".into()))?;
    let metadata = metadata.ok_or_else(|| AppError::ValidationFailed("metadata is required".into()))?;
    let meta: AnalyzeSaveMetadata = serde_json::from_str(&metadata)
        .map_err(|e| AppError::ValidationFailed(format!("invalid metadata: {}", e)))?;

    let outcome = match meta.draft_id {
        Some(draft_id) => {
            state
                .saves
                .resume_with_image(user_id, draft_id, image, meta.food_rate)
                .await?
        }
        None => {
            let food = meta
                .food_input()
                .map_err(|e| AppError::ValidationFailed(format!("invalid metadata: {}", e)))?;
            state
                .saves
                .save_with_image(user_id, &food, image, meta.food_rate)
                .await?
        }
    };

    let location = format!("/api/v1/food/detail?id={}", outcome.food.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(outcome),
    ))
}

async fn read_upload(mut mp: Multipart) -> AppResult<(Option<ImageUpload>, Option<String>)> {
    let mut image = None;
    let mut metadata = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::ValidationFailed(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("image") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationFailed(format!("unreadable image: {}", e)))?;
                image = Some(ImageUpload {
                    bytes,
                    content_type,
                });
            }
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::ValidationFailed(format!("unreadable metadata: {}", e)))?;
                metadata = Some(text);
            }
            _ => {}
        }
    }
    Ok((image, metadata))
}

fn check_image_type(image: &ImageUpload) -> AppResult<()> {
    match ext_from_mime(&image.content_type) {
        Some(_) => Ok(()),
        None => Err(AppError::ValidationFailed(format!(
            "unsupported image type {}",
            image.content_type
        ))),
    }
}
