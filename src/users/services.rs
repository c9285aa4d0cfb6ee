use std::{str::FromStr, sync::Arc, time::Duration};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;
use uuid::Uuid;

use crate::{
    deadline::within,
    error::{AppError, AppResult},
    food::{
        repo::HistoryStore,
        repo_types::NutritionTotals,
        tags::{resolve, TagCatalog},
    },
    time_window::day_window,
};

/// One eaten food in a user's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub food_type: Option<String>,
    pub rating: Option<i16>,
    #[serde(with = "time::serde::rfc3339")]
    pub eaten_at: OffsetDateTime,
}

pub struct NutritionAggregator {
    history: Arc<dyn HistoryStore>,
    tags: Arc<TagCatalog>,
    day_offset: UtcOffset,
    db_timeout: Duration,
}

impl NutritionAggregator {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        tags: Arc<TagCatalog>,
        day_offset: UtcOffset,
        db_timeout: Duration,
    ) -> Self {
        Self {
            history,
            tags,
            day_offset,
            db_timeout,
        }
    }

    /// Calories, protein and sugar eaten during the day of `now`, each
    /// rounded once to two decimals.
    pub async fn daily_summary(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> AppResult<NutritionTotals> {
        let (start, end) = day_window(now, self.day_offset);
        let raw = within(
            self.db_timeout,
            "sum daily nutrition",
            self.history.totals_between(user_id, start, end),
        )
        .await
        .map_err(AppError::persistence)?;

        Ok(NutritionTotals {
            calories: round2(raw.calories),
            protein: round2(raw.protein),
            sugar: round2(raw.sugar),
        })
    }

    /// Everything the user ate, most recent first, with tag names resolved.
    pub async fn history(&self, user_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        let entries = within(
            self.db_timeout,
            "list food history",
            self.history.entries_with_food(user_id),
        )
        .await
        .map_err(AppError::persistence)?;
        let names = self.tags.names().await.map_err(AppError::persistence)?;

        Ok(entries
            .into_iter()
            .map(|(entry, food)| {
                let (tags, dangling) = resolve(&names, &food.tags);
                if !dangling.is_empty() {
                    warn!(food_id = %food.id, ?dangling, "food references unknown food groups");
                }
                HistoryEntry {
                    id: food.id,
                    name: food.name,
                    grade: food.grade,
                    tags,
                    image_url: food.image_url,
                    food_type: food.food_type,
                    rating: entry.rating,
                    eaten_at: entry.created_at,
                }
            })
            .collect())
    }
}

/// Rounds to two decimals, halves away from zero, on the decimal value the
/// float prints as (1.005 rounds to 1.01, not to 1.00).
pub fn round2(v: f64) -> f64 {
    Decimal::from_str(&v.to_string())
        .ok()
        .and_then(|d| {
            d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .to_f64()
        })
        .unwrap_or(v)
}
