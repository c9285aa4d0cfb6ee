use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

use super::repo::FoodGroupStore;
use crate::deadline::within;

pub type TagNames = Arc<HashMap<i32, String>>;

struct Cached {
    loaded_at: Instant,
    names: TagNames,
}

/// Food group id → display name, reloaded from the store once `ttl` has
/// passed or after [`TagCatalog::invalidate`].
pub struct TagCatalog {
    groups: Arc<dyn FoodGroupStore>,
    ttl: Duration,
    db_timeout: Duration,
    cache: RwLock<Option<Cached>>,
}

impl TagCatalog {
    pub fn new(groups: Arc<dyn FoodGroupStore>, ttl: Duration, db_timeout: Duration) -> Self {
        Self {
            groups,
            ttl,
            db_timeout,
            cache: RwLock::new(None),
        }
    }

    pub async fn names(&self) -> anyhow::Result<TagNames> {
        if let Some(names) = self.fresh(&*self.cache.read().await) {
            return Ok(names);
        }

        let mut slot = self.cache.write().await;
        if let Some(names) = self.fresh(&slot) {
            return Ok(names);
        }

        let groups = within(self.db_timeout, "load food groups", self.groups.all_groups()).await?;
        let names: TagNames = Arc::new(groups.into_iter().map(|g| (g.id, g.name)).collect());
        debug!(count = names.len(), "food group catalog loaded");
        *slot = Some(Cached {
            loaded_at: Instant::now(),
            names: names.clone(),
        });
        Ok(names)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    fn fresh(&self, cached: &Option<Cached>) -> Option<TagNames> {
        cached
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| c.names.clone())
    }
}

/// Resolves tag ids to names in order. Ids with no food group are returned
/// separately instead of failing.
pub fn resolve(names: &HashMap<i32, String>, ids: &[i32]) -> (Vec<String>, Vec<i32>) {
    let mut resolved = Vec::with_capacity(ids.len());
    let mut dangling = Vec::new();
    for id in ids {
        match names.get(id) {
            Some(name) => resolved.push(name.clone()),
            None => dangling.push(*id),
        }
    }
    (resolved, dangling)
}
