use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a food row. Image-bearing saves start as `Draft` and become
/// `Complete` once the uploaded image is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodStatus {
    Draft,
    Complete,
}

impl FoodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FoodStatus::Draft => "draft",
            FoodStatus::Complete => "complete",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "complete" => FoodStatus::Complete,
            _ => FoodStatus::Draft,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FoodRow {
    pub id: Uuid,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
    pub fat: f64,
    pub carbohydrate: f64,
    pub grade: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<i32>,
    pub food_type: Option<String>,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Food {
    pub id: Uuid,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
    pub fat: f64,
    pub carbohydrate: f64,
    pub grade: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<i32>,
    pub food_type: Option<String>,
    pub status: FoodStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<FoodRow> for Food {
    fn from(r: FoodRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            calories: r.calories,
            protein: r.protein,
            sugar: r.sugar,
            fat: r.fat,
            carbohydrate: r.carbohydrate,
            grade: r.grade,
            image_url: r.image_url,
            tags: r.tags,
            food_type: r.food_type,
            status: FoodStatus::from_db(&r.status),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Nutrition and catalog fields supplied by the client when saving a food.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoodInput {
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbohydrate: f64,
    pub grade: Option<String>,
    #[serde(default)]
    pub tags: Vec<i32>,
    pub food_type: Option<String>,
}

impl FoodInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        let fields = [
            ("calories", self.calories),
            ("protein", self.protein),
            ("sugar", self.sugar),
            ("fat", self.fat),
            ("carbohydrate", self.carbohydrate),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", field));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FoodHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub food_id: Uuid,
    pub rating: Option<i16>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FoodGroup {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
}

#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub page: u32,
    pub limit: u32,
    pub name: Option<String>,
    /// A listed food must carry every one of these tags.
    pub tags: Vec<i32>,
}

impl CatalogQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub data: Vec<Food>,
    pub total: i64,
}

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

pub fn validate_rating(rating: Option<i16>) -> Result<Option<i16>, String> {
    match rating {
        Some(r) if !(MIN_RATING..=MAX_RATING).contains(&r) => Err(format!(
            "food_rate must be between {} and {}",
            MIN_RATING, MAX_RATING
        )),
        other => Ok(other),
    }
}
