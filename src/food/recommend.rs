use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    repo::{FoodStore, HistoryStore},
    repo_types::{CatalogQuery, Food},
};
use crate::deadline::within;

/// Ranked food suggestions for a user, most relevant first. Recomputed on
/// every call.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, user_id: Uuid) -> anyhow::Result<Vec<Food>>;
}

const CANDIDATE_PAGE: u32 = 200;
const DEFAULT_WEIGHT: i16 = 3;
const DISLIKED_AT_OR_BELOW: i16 = 2;

/// Scores catalog foods by how well their tags match what the user has
/// eaten, weighting each eaten food by its rating.
pub struct HistoryRecommender {
    foods: Arc<dyn FoodStore>,
    history: Arc<dyn HistoryStore>,
    limit: usize,
    db_timeout: Duration,
}

impl HistoryRecommender {
    pub fn new(
        foods: Arc<dyn FoodStore>,
        history: Arc<dyn HistoryStore>,
        limit: usize,
        db_timeout: Duration,
    ) -> Self {
        Self {
            foods,
            history,
            limit,
            db_timeout,
        }
    }
}

#[async_trait]
impl Recommender for HistoryRecommender {
    async fn recommend(&self, user_id: Uuid) -> anyhow::Result<Vec<Food>> {
        let entries = within(
            self.db_timeout,
            "list food history",
            self.history.entries_with_food(user_id),
        )
        .await?;

        let mut affinity: HashMap<i32, f64> = HashMap::new();
        let mut latest_rating: HashMap<Uuid, Option<i16>> = HashMap::new();
        for (entry, food) in &entries {
            let weight = f64::from(entry.rating.unwrap_or(DEFAULT_WEIGHT)) / 5.0;
            for tag in &food.tags {
                *affinity.entry(*tag).or_default() += weight;
            }
            // entries are newest first
            latest_rating.entry(food.id).or_insert(entry.rating);
        }
        let disliked: HashSet<Uuid> = latest_rating
            .into_iter()
            .filter(|(_, r)| r.map_or(false, |r| r <= DISLIKED_AT_OR_BELOW))
            .map(|(id, _)| id)
            .collect();

        // Walk the whole catalog a page at a time, keeping only the best `limit`.
        // With no history every score is zero and grade then name decides.
        let mut best: Vec<(f64, Food)> = Vec::with_capacity(self.limit + CANDIDATE_PAGE as usize);
        let mut page = 1;
        loop {
            let query = CatalogQuery {
                page,
                limit: CANDIDATE_PAGE,
                name: None,
                tags: Vec::new(),
            };
            let batch = within(self.db_timeout, "list foods", self.foods.list_foods(&query))
                .await?
                .data;
            let fetched = batch.len();

            best.extend(
                batch
                    .into_iter()
                    .filter(|f| !disliked.contains(&f.id))
                    .map(|f| {
                        let score = f.tags.iter().filter_map(|t| affinity.get(t)).sum::<f64>();
                        (score, f)
                    }),
            );
            best.sort_by(|(sa, fa), (sb, fb)| {
                sb.partial_cmp(sa)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| by_grade_then_name(fa, fb))
            });
            best.truncate(self.limit);

            if fetched < CANDIDATE_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(best.into_iter().map(|(_, f)| f).collect())
    }
}

/// Best grade first ("A" before "E"), ungraded last.
fn by_grade_then_name(a: &Food, b: &Food) -> Ordering {
    (a.grade.is_none(), &a.grade, &a.name).cmp(&(b.grade.is_none(), &b.grade, &b.name))
}
