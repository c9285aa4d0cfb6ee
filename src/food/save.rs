//! Saving foods: create → upload → link → rate.
//!
//! Nothing is rolled back. A failed upload or link leaves a draft food with
//! no image; the client resumes with the draft id and the upload is retried
//! against the same object key.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo::{FoodStore, HistoryStore},
    repo_types::{validate_rating, Food, FoodHistory, FoodInput, FoodStatus},
};
use crate::{
    config::Timeouts,
    deadline::within,
    error::{AppError, AppResult},
    storage::{ext_from_mime, food_image_key, StorageClient},
};

pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ImageUpload {
    fn validate(&self) -> AppResult<()> {
        if self.bytes.is_empty() {
            return Err(AppError::ValidationFailed("image is empty".into()));
        }
        if ext_from_mime(&self.content_type).is_none() {
            return Err(AppError::ValidationFailed(format!(
                "unsupported image type {}",
                self.content_type
            )));
        }
        Ok(())
    }
}

/// Non-fatal problem in an otherwise successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveWarning {
    pub step: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub food: Food,
    pub history_id: Uuid,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SaveWarning>,
}

pub struct SaveOrchestrator {
    foods: Arc<dyn FoodStore>,
    history: Arc<dyn HistoryStore>,
    storage: Arc<dyn StorageClient>,
    timeouts: Timeouts,
}

impl SaveOrchestrator {
    pub fn new(
        foods: Arc<dyn FoodStore>,
        history: Arc<dyn HistoryStore>,
        storage: Arc<dyn StorageClient>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            foods,
            history,
            storage,
            timeouts,
        }
    }

    /// Saves a food without an image. Complete as soon as it is created.
    pub async fn save(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        rating: Option<i16>,
    ) -> AppResult<SaveOutcome> {
        let rating = check_input(input, rating)?;
        let (food, history) = self.create(user_id, input, FoodStatus::Complete).await?;
        let warnings = self.rate(&history, rating).await;
        Ok(SaveOutcome {
            food,
            history_id: history.id,
            warnings,
        })
    }

    pub async fn save_with_image(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        image: ImageUpload,
        rating: Option<i16>,
    ) -> AppResult<SaveOutcome> {
        let rating = check_input(input, rating)?;
        image.validate()?;

        let (draft, history) = self.create(user_id, input, FoodStatus::Draft).await?;
        info!(%user_id, draft_id = %draft.id, "draft food created");
        self.attach_image(draft, history, image, rating).await
    }

    /// Continues an image save that failed at upload or link.
    pub async fn resume_with_image(
        &self,
        user_id: Uuid,
        draft_id: Uuid,
        image: ImageUpload,
        rating: Option<i16>,
    ) -> AppResult<SaveOutcome> {
        let rating = validate_rating(rating).map_err(AppError::ValidationFailed)?;
        image.validate()?;

        let food = within(self.timeouts.db, "find food", self.foods.find_food(draft_id))
            .await
            .map_err(AppError::persistence)?
            .ok_or_else(|| AppError::NotFound(format!("draft {}", draft_id)))?;
        let history = within(
            self.timeouts.db,
            "find history",
            self.history.latest_entry(user_id, draft_id),
        )
        .await
        .map_err(AppError::persistence)?
        .ok_or_else(|| AppError::NotFound(format!("draft {}", draft_id)))?;

        if food.status == FoodStatus::Complete {
            info!(%user_id, food_id = %food.id, "resume on complete food, nothing to upload");
            let warnings = self.rate(&history, rating).await;
            return Ok(SaveOutcome {
                food,
                history_id: history.id,
                warnings,
            });
        }

        let touched = within(self.timeouts.db, "touch draft", self.foods.touch_draft(draft_id))
            .await
            .map_err(AppError::persistence)?;
        if !touched {
            warn!(%draft_id, "draft changed state before resume, linking anyway");
        }

        info!(%user_id, %draft_id, "resuming image save");
        self.attach_image(food, history, image, rating).await
    }

    /// Logs an existing catalog food as eaten by `user_id`.
    pub async fn record_meal(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        rating: Option<i16>,
    ) -> AppResult<SaveOutcome> {
        let rating = validate_rating(rating).map_err(AppError::ValidationFailed)?;

        let food = within(self.timeouts.db, "find food", self.foods.find_food(food_id))
            .await
            .map_err(AppError::persistence)?
            .filter(|f| f.status == FoodStatus::Complete)
            .ok_or_else(|| AppError::NotFound(format!("food {}", food_id)))?;

        let history = within(
            self.timeouts.db,
            "append history",
            self.history.append_entry(user_id, food.id),
        )
        .await
        .map_err(AppError::persistence)?;

        let warnings = self.rate(&history, rating).await;
        Ok(SaveOutcome {
            food,
            history_id: history.id,
            warnings,
        })
    }

    async fn create(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        status: FoodStatus,
    ) -> AppResult<(Food, FoodHistory)> {
        within(
            self.timeouts.db,
            "create food",
            self.foods.create_with_history(user_id, input, status),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, %user_id, "food create failed");
            AppError::persistence(format!("{:#}", e))
        })
    }

    async fn attach_image(
        &self,
        draft: Food,
        history: FoodHistory,
        image: ImageUpload,
        rating: Option<i16>,
    ) -> AppResult<SaveOutcome> {
        let draft_id = draft.id;
        let key = food_image_key(draft_id);

        let url = within(
            self.timeouts.storage,
            "image upload",
            self.storage.put_object(&key, image.bytes, &image.content_type),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, %draft_id, %key, "image upload failed, draft kept for retry");
            AppError::ImageUploadFailed {
                draft_id,
                reason: format!("{:#}", e),
            }
        })?;

        let food = within(
            self.timeouts.db,
            "link image",
            self.foods.link_image(draft_id, &url),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, %draft_id, "image link failed, draft kept for retry");
            AppError::LinkFailed {
                draft_id,
                reason: format!("{:#}", e),
            }
        })?;

        info!(food_id = %food.id, "food image linked");
        let warnings = self.rate(&history, rating).await;
        Ok(SaveOutcome {
            food,
            history_id: history.id,
            warnings,
        })
    }

    async fn rate(&self, history: &FoodHistory, rating: Option<i16>) -> Vec<SaveWarning> {
        let Some(rating) = rating else {
            return Vec::new();
        };
        match within(
            self.timeouts.db,
            "set rating",
            self.history.set_rating(history.id, rating),
        )
        .await
        {
            Ok(()) => Vec::new(),
            Err(e) => {
                warn!(error = %e, history_id = %history.id, rating, "rating not saved");
                vec![SaveWarning {
                    step: "rate",
                    message: format!("rating was not saved: {:#}", e),
                }]
            }
        }
    }
}

fn check_input(input: &FoodInput, rating: Option<i16>) -> AppResult<Option<i16>> {
    input.validate().map_err(AppError::ValidationFailed)?;
    validate_rating(rating).map_err(AppError::ValidationFailed)
}
