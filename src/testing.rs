//! In-memory stand-ins for Postgres, S3 and the analysis service.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::{
    analysis::{AnalysisClient, NutritionEstimate},
    food::{
        news::NewsFeed,
        repo::{already_linked, FoodGroupStore, FoodStore, HistoryStore, ScanLedger},
        repo_types::{
            CatalogPage, CatalogQuery, Food, FoodGroup, FoodHistory, FoodInput, FoodStatus,
            NutritionTotals,
        },
    },
    storage::StorageClient,
    time_window::day_window,
    users::repo::{User, UserStore},
};

/// Midday of the current UTC day. Data seeded here stays inside the day
/// window a handler computes from its own clock reading.
pub fn today_noon() -> OffsetDateTime {
    let (start, _) = day_window(OffsetDateTime::now_utc(), UtcOffset::UTC);
    start + time::Duration::hours(12)
}

#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub foods: Mutex<HashMap<Uuid, Food>>,
    pub history: Mutex<Vec<FoodHistory>>,
    pub scans: Mutex<Vec<(Uuid, OffsetDateTime)>>,
    pub groups: Mutex<Vec<FoodGroup>>,
    pub fail_create: AtomicBool,
    pub fail_link: AtomicBool,
    pub fail_rating: AtomicBool,
    pub fail_scan_record: AtomicBool,
    pub group_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn add_user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().push(User {
            id,
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
        id
    }

    pub fn add_scans(&self, user_id: Uuid, n: usize, at: OffsetDateTime) {
        let mut scans = self.scans.lock().unwrap();
        for _ in 0..n {
            scans.push((user_id, at));
        }
    }

    pub fn scan_count(&self, user_id: Uuid) -> usize {
        self.scans
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .count()
    }

    pub fn add_group(&self, id: i32, name: &str) {
        self.groups.lock().unwrap().push(FoodGroup {
            id,
            name: name.to_string(),
        });
    }

    /// Inserts a complete catalog food.
    pub fn add_food(&self, name: &str, grade: &str, tags: &[i32], calories: f64) -> Uuid {
        let now = OffsetDateTime::now_utc();
        let food = Food {
            id: Uuid::new_v4(),
            name: name.to_string(),
            calories,
            protein: 0.0,
            sugar: 0.0,
            fat: 0.0,
            carbohydrate: 0.0,
            grade: Some(grade.to_string()),
            image_url: Some(format!("https://fake.local/food/{}", name)),
            tags: tags.to_vec(),
            food_type: None,
            status: FoodStatus::Complete,
            created_at: now,
            updated_at: now,
        };
        let id = food.id;
        self.foods.lock().unwrap().insert(id, food);
        id
    }

    pub fn food(&self, id: Uuid) -> Option<Food> {
        self.foods.lock().unwrap().get(&id).cloned()
    }

    pub fn set_food_nutrition(&self, id: Uuid, calories: f64, protein: f64, sugar: f64) {
        if let Some(f) = self.foods.lock().unwrap().get_mut(&id) {
            f.calories = calories;
            f.protein = protein;
            f.sugar = sugar;
        }
    }

    pub fn add_history_at(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        rating: Option<i16>,
        at: OffsetDateTime,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.history.lock().unwrap().push(FoodHistory {
            id,
            user_id,
            food_id,
            rating,
            created_at: at,
        });
        id
    }

    pub fn history_for(&self, user_id: Uuid) -> Vec<FoodHistory> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Backdates a food so the reclaimer sees it as stale.
    pub fn age_food(&self, id: Uuid, at: OffsetDateTime) {
        if let Some(f) = self.foods.lock().unwrap().get_mut(&id) {
            f.created_at = at;
            f.updated_at = at;
        }
    }
}

#[async_trait]
impl FoodStore for MemoryStore {
    async fn create_with_history(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        status: FoodStatus,
    ) -> anyhow::Result<(Food, FoodHistory)> {
        anyhow::ensure!(!self.fail_create.load(Ordering::SeqCst), "insert food: db down");
        let now = OffsetDateTime::now_utc();
        let food = Food {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            calories: input.calories,
            protein: input.protein,
            sugar: input.sugar,
            fat: input.fat,
            carbohydrate: input.carbohydrate,
            grade: input.grade.clone(),
            image_url: None,
            tags: input.tags.clone(),
            food_type: input.food_type.clone(),
            status,
            created_at: now,
            updated_at: now,
        };
        self.foods.lock().unwrap().insert(food.id, food.clone());
        let history_id = self.add_history_at(user_id, food.id, None, now);
        let history = FoodHistory {
            id: history_id,
            user_id,
            food_id: food.id,
            rating: None,
            created_at: now,
        };
        Ok((food, history))
    }

    async fn link_image(&self, food_id: Uuid, image_url: &str) -> anyhow::Result<Food> {
        anyhow::ensure!(!self.fail_link.load(Ordering::SeqCst), "update food image: db down");
        let current = {
            let mut foods = self.foods.lock().unwrap();
            match foods.get_mut(&food_id) {
                Some(food) if food.status == FoodStatus::Draft => {
                    food.image_url = Some(image_url.to_string());
                    food.status = FoodStatus::Complete;
                    food.updated_at = OffsetDateTime::now_utc();
                    return Ok(food.clone());
                }
                other => other.cloned(),
            }
        };
        already_linked(food_id, image_url, current)
    }

    async fn touch_draft(&self, food_id: Uuid) -> anyhow::Result<bool> {
        let mut foods = self.foods.lock().unwrap();
        match foods.get_mut(&food_id) {
            Some(food) if food.status == FoodStatus::Draft => {
                food.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_food(&self, food_id: Uuid) -> anyhow::Result<Option<Food>> {
        Ok(self.food(food_id))
    }

    async fn list_foods(&self, query: &CatalogQuery) -> anyhow::Result<CatalogPage> {
        let needle = query.name.as_deref().map(str::to_lowercase);
        let mut matching: Vec<Food> = self
            .foods
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.status == FoodStatus::Complete)
            .filter(|f| {
                needle
                    .as_deref()
                    .map_or(true, |n| f.name.to_lowercase().contains(n))
            })
            .filter(|f| query.tags.iter().all(|t| f.tags.contains(t)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let total = matching.len() as i64;
        let data = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok(CatalogPage { data, total })
    }

    async fn stale_drafts(&self, updated_before: OffsetDateTime) -> anyhow::Result<Vec<Uuid>> {
        Ok(self
            .foods
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.status == FoodStatus::Draft && f.updated_at < updated_before)
            .map(|f| f.id)
            .collect())
    }

    async fn delete_draft(&self, food_id: Uuid) -> anyhow::Result<bool> {
        let mut foods = self.foods.lock().unwrap();
        match foods.get(&food_id) {
            Some(f) if f.status == FoodStatus::Draft => {
                foods.remove(&food_id);
                self.history.lock().unwrap().retain(|h| h.food_id != food_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append_entry(&self, user_id: Uuid, food_id: Uuid) -> anyhow::Result<FoodHistory> {
        let now = OffsetDateTime::now_utc();
        let id = self.add_history_at(user_id, food_id, None, now);
        Ok(FoodHistory {
            id,
            user_id,
            food_id,
            rating: None,
            created_at: now,
        })
    }

    async fn set_rating(&self, history_id: Uuid, rating: i16) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_rating.load(Ordering::SeqCst), "update rating: db down");
        let mut history = self.history.lock().unwrap();
        let row = history
            .iter_mut()
            .find(|h| h.id == history_id)
            .ok_or_else(|| anyhow::anyhow!("history row {} not found", history_id))?;
        row.rating = Some(rating);
        Ok(())
    }

    async fn latest_entry(
        &self,
        user_id: Uuid,
        food_id: Uuid,
    ) -> anyhow::Result<Option<FoodHistory>> {
        Ok(self
            .history_for(user_id)
            .into_iter()
            .filter(|h| h.food_id == food_id)
            .max_by_key(|h| h.created_at))
    }

    async fn totals_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<NutritionTotals> {
        let foods = self.foods.lock().unwrap();
        let mut totals = NutritionTotals::default();
        for h in self.history_for(user_id) {
            if h.created_at < start || h.created_at >= end {
                continue;
            }
            if let Some(f) = foods.get(&h.food_id) {
                totals.calories += f.calories;
                totals.protein += f.protein;
                totals.sugar += f.sugar;
            }
        }
        Ok(totals)
    }

    async fn entries_with_food(&self, user_id: Uuid) -> anyhow::Result<Vec<(FoodHistory, Food)>> {
        let foods = self.foods.lock().unwrap();
        let mut entries: Vec<(FoodHistory, Food)> = self
            .history_for(user_id)
            .into_iter()
            .filter_map(|h| foods.get(&h.food_id).cloned().map(|f| (h, f)))
            .collect();
        entries.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        Ok(entries)
    }
}

#[async_trait]
impl ScanLedger for MemoryStore {
    async fn count_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<i64> {
        Ok(self
            .scans
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, at)| *u == user_id && *at >= start && *at < end)
            .count() as i64)
    }

    async fn record_scan(&self, user_id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.fail_scan_record.load(Ordering::SeqCst),
            "insert scan history: db down"
        );
        self.scans.lock().unwrap().push((user_id, at));
        Ok(())
    }
}

#[async_trait]
impl FoodGroupStore for MemoryStore {
    async fn all_groups(&self) -> anyhow::Result<Vec<FoodGroup>> {
        self.group_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.groups.lock().unwrap().clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub objects: Mutex<HashMap<String, Bytes>>,
    /// Every key a put was attempted on, in order.
    pub put_keys: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_put: AtomicBool,
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<String> {
        self.put_keys.lock().unwrap().push(key.to_string());
        anyhow::ensure!(!self.fail_put.load(Ordering::SeqCst), "s3 put_object: connection reset");
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(format!("https://fake.local/{}", key))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

pub struct FakeAnalyzer {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    response: serde_json::Value,
    delay: Option<Duration>,
}

impl Default for FakeAnalyzer {
    fn default() -> Self {
        Self::returning(json!({"name": "Fried Rice", "calories": 333.0, "grade": "C"}))
    }
}

impl FakeAnalyzer {
    pub fn returning(response: serde_json::Value) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            response,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalyzer {
    async fn analyze(&self, _image: Bytes, _ct: &str) -> anyhow::Result<NutritionEstimate> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "unsupported image format");
        Ok(NutritionEstimate(self.response.clone()))
    }
}

pub struct FakeNews(pub serde_json::Value);

impl Default for FakeNews {
    fn default() -> Self {
        Self(json!({"articles": [{"title": "Eat more greens"}]}))
    }
}

#[async_trait]
impl NewsFeed for FakeNews {
    async fn latest(&self) -> anyhow::Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}
