use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::{
    repo_types::{CatalogQuery, Food, FoodStatus},
    tags::resolve,
};
use crate::{
    deadline::within,
    error::{AppError, AppResult},
    state::AppState,
};

pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct FoodDetail {
    #[serde(flatten)]
    pub food: Food,
    pub tag_names: Vec<String>,
    /// The caller's most recent rating of this food.
    pub rating: Option<i16>,
}

#[derive(Debug, Serialize)]
pub struct FoodPage {
    pub data: Vec<Food>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

pub async fn food_detail(st: &AppState, user_id: Uuid, food_id: Uuid) -> AppResult<FoodDetail> {
    let timeout = st.config.timeouts.db;
    let food = within(timeout, "find food", st.foods.find_food(food_id))
        .await
        .map_err(AppError::persistence)?
        .filter(|f| f.status == FoodStatus::Complete)
        .ok_or_else(|| AppError::NotFound(format!("food {}", food_id)))?;

    let rating = within(timeout, "latest history", st.history.latest_entry(user_id, food_id))
        .await
        .map_err(AppError::persistence)?
        .and_then(|h| h.rating);

    let names = st.tags.names().await.map_err(AppError::persistence)?;
    let (tag_names, dangling) = resolve(&names, &food.tags);
    if !dangling.is_empty() {
        warn!(%food_id, ?dangling, "food references unknown food groups");
    }

    Ok(FoodDetail {
        food,
        tag_names,
        rating,
    })
}

pub async fn list_foods(st: &AppState, query: CatalogQuery) -> AppResult<FoodPage> {
    if query.page == 0 {
        return Err(AppError::ValidationFailed("page starts at 1".into()));
    }
    if query.limit == 0 || query.limit > MAX_PAGE_LIMIT {
        return Err(AppError::ValidationFailed(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    let page = within(st.config.timeouts.db, "list foods", st.foods.list_foods(&query))
        .await
        .map_err(AppError::persistence)?;
    let limit = i64::from(query.limit);

    Ok(FoodPage {
        data: page.data,
        total: page.total,
        page: query.page,
        limit: query.limit,
        total_pages: (page.total + limit - 1) / limit,
    })
}

/// Parses a `tags` query value such as `"1,4,7"`. Empty means no filter.
pub fn parse_tags(raw: &str) -> AppResult<Vec<i32>> {
    lazy_static! {
        static ref TAGS_RE: Regex = Regex::new(r"^\s*\d+\s*(,\s*\d+\s*)*$").unwrap();
    }
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    if !TAGS_RE.is_match(raw) {
        return Err(AppError::ValidationFailed(format!("malformed tags filter {:?}", raw)));
    }
    raw.split(',')
        .map(|t| {
            t.trim()
                .parse::<i32>()
                .map_err(|_| AppError::ValidationFailed(format!("tag id {} out of range", t.trim())))
        })
        .collect()
}
