use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::FoodInput;

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub name: String,
    /// Comma separated food group ids.
    #[serde(default)]
    pub tags: String,
}
fn default_page() -> u32 { 1 }
fn default_limit() -> u32 { 10 }

#[derive(Debug, Deserialize)]
pub struct EatFoodRequest {
    pub food_id: Uuid,
    pub food_rate: Option<i16>,
}

/// `metadata` part of an analyze-and-save upload.
///
/// A first save carries the food fields. A retry only needs `draft_id`;
/// any food fields sent with it are ignored.
#[derive(Debug, Deserialize)]
pub struct AnalyzeSaveMetadata {
    pub food_rate: Option<i16>,
    /// Set when retrying a save that failed after its draft was created.
    pub draft_id: Option<Uuid>,
    #[serde(flatten)]
    food: serde_json::Map<String, serde_json::Value>,
}

impl AnalyzeSaveMetadata {
    pub fn food_input(&self) -> Result<FoodInput, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.food.clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct NewsResponse {
    pub news: serde_json::Value,
}
