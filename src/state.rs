use std::sync::Arc;

use crate::{
    analysis::{AnalysisClient, HttpAnalysisClient},
    config::AppConfig,
    db::{self, PgRepo},
    food::{
        news::{HttpNewsFeed, NewsFeed},
        quota::QuotaTracker,
        recommend::{HistoryRecommender, Recommender},
        repo::{FoodGroupStore, FoodStore, HistoryStore, ScanLedger},
        save::SaveOrchestrator,
        scan::AnalysisOrchestrator,
        tags::TagCatalog,
    },
    storage::{Storage, StorageClient},
    users::{repo::UserStore, services::NutritionAggregator},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub foods: Arc<dyn FoodStore>,
    pub history: Arc<dyn HistoryStore>,
    pub storage: Arc<dyn StorageClient>,
    pub tags: Arc<TagCatalog>,
    pub scans: Arc<AnalysisOrchestrator>,
    pub saves: Arc<SaveOrchestrator>,
    pub nutrition: Arc<NutritionAggregator>,
    pub recommender: Arc<dyn Recommender>,
    pub news: Arc<dyn NewsFeed>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let repo = Arc::new(PgRepo::new(pool));

        let storage = Arc::new(Storage::new(&config.s3).await?) as Arc<dyn StorageClient>;
        let analyzer = Arc::new(HttpAnalysisClient::new(
            config.analysis_url.clone(),
            config.timeouts.analysis,
        )?) as Arc<dyn AnalysisClient>;
        let news = Arc::new(HttpNewsFeed::new(
            config.news_url.clone(),
            config.timeouts.storage,
        )?) as Arc<dyn NewsFeed>;

        Ok(Self::assemble(config, repo, storage, analyzer, news))
    }

    /// Wires every service on top of one store implementing all persistence traits.
    pub fn assemble<R>(
        config: Arc<AppConfig>,
        repo: Arc<R>,
        storage: Arc<dyn StorageClient>,
        analyzer: Arc<dyn AnalysisClient>,
        news: Arc<dyn NewsFeed>,
    ) -> Self
    where
        R: UserStore + FoodStore + HistoryStore + ScanLedger + FoodGroupStore + 'static,
    {
        let timeouts = config.timeouts;

        let tags = Arc::new(TagCatalog::new(
            repo.clone(),
            config.tag_cache_ttl,
            timeouts.db,
        ));

        let quota = QuotaTracker::new(repo.clone(), &config.quota, timeouts.db);
        let mut scans = AnalysisOrchestrator::new(quota, repo.clone(), analyzer, timeouts);
        if config.quota.strict {
            scans = scans.with_strict_admission();
        }

        let saves = SaveOrchestrator::new(repo.clone(), repo.clone(), storage.clone(), timeouts);
        let nutrition = NutritionAggregator::new(
            repo.clone(),
            tags.clone(),
            config.quota.day_offset,
            timeouts.db,
        );
        let recommender = HistoryRecommender::new(
            repo.clone(),
            repo.clone(),
            config.recommendation_limit,
            timeouts.db,
        );

        Self {
            users: repo.clone(),
            foods: repo.clone(),
            history: repo,
            storage,
            tags,
            scans: Arc::new(scans),
            saves: Arc::new(saves),
            nutrition: Arc::new(nutrition),
            recommender: Arc::new(recommender),
            news,
            config,
        }
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> (
        Self,
        Arc<crate::testing::MemoryStore>,
        Arc<crate::testing::FakeStorage>,
    ) {
        use crate::testing::{FakeAnalyzer, FakeNews, FakeStorage, MemoryStore};

        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let state = Self::assemble(
            Arc::new(AppConfig::test_default()),
            store.clone(),
            storage.clone(),
            Arc::new(FakeAnalyzer::default()),
            Arc::new(FakeNews::default()),
        );
        (state, store, storage)
    }
}
