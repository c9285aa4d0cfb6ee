//! Sweeps drafts whose image save was abandoned.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tracing::{info, warn};

use super::repo::FoodStore;
use crate::storage::{food_image_key, StorageClient};

/// Deletes drafts not touched since `now - max_age` and any object already
/// uploaded under their key. Returns how many drafts were removed.
pub async fn reclaim_stale_drafts(
    foods: &dyn FoodStore,
    storage: &dyn StorageClient,
    max_age: Duration,
    now: OffsetDateTime,
) -> anyhow::Result<usize> {
    let cutoff = now - max_age;
    let stale = foods.stale_drafts(cutoff).await?;

    let mut removed = 0;
    for id in stale {
        // A resume may have completed the draft since it was listed.
        if !foods.delete_draft(id).await? {
            continue;
        }
        removed += 1;
        let key = food_image_key(id);
        if let Err(e) = storage.delete_object(&key).await {
            warn!(error = %e, food_id = %id, %key, "orphaned image not deleted");
        }
    }

    if removed > 0 {
        info!(removed, "stale drafts reclaimed");
    }
    Ok(removed)
}

pub fn spawn_reclaimer(
    foods: Arc<dyn FoodStore>,
    storage: Arc<dyn StorageClient>,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = (max_age / 4).clamp(Duration::from_secs(60), Duration::from_secs(3600));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) =
                reclaim_stale_drafts(&*foods, &*storage, max_age, OffsetDateTime::now_utc()).await
            {
                warn!(error = %e, "stale draft sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bytes::Bytes;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        food::{
            repo_types::{FoodInput, FoodStatus},
            save::{ImageUpload, SaveOrchestrator},
        },
        testing::{FakeStorage, MemoryStore},
    };

    #[tokio::test]
    async fn only_old_drafts_are_reclaimed() {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let saves = SaveOrchestrator::new(
            store.clone(),
            store.clone(),
            storage.clone(),
            AppConfig::test_default().timeouts,
        );
        let user = Uuid::new_v4();
        let input = FoodInput {
            name: "Soup".into(),
            ..Default::default()
        };
        let image = || ImageUpload {
            bytes: Bytes::from_static(b"png"),
            content_type: "image/png".into(),
        };

        store.fail_link.store(true, Ordering::SeqCst);
        let old = saves
            .save_with_image(user, &input, image(), None)
            .await
            .unwrap_err()
            .draft_id()
            .unwrap();
        let fresh = saves
            .save_with_image(user, &input, image(), None)
            .await
            .unwrap_err()
            .draft_id()
            .unwrap();
        store.fail_link.store(false, Ordering::SeqCst);
        let done = saves.save(user, &input, None).await.unwrap().food.id;

        let now = OffsetDateTime::now_utc();
        store.age_food(old, now - time::Duration::hours(48));
        store.age_food(done, now - time::Duration::hours(48));

        let removed = reclaim_stale_drafts(&*store, &*storage, Duration::from_secs(86_400), now)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.food(old).is_none());
        assert_eq!(store.food(fresh).unwrap().status, FoodStatus::Draft);
        assert!(store.food(done).is_some());
        assert_eq!(store.history_for(user).len(), 2);
        assert_eq!(*storage.deleted.lock().unwrap(), vec![food_image_key(old)]);
    }
}
