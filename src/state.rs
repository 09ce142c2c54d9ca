use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::git::GitClient;
use crate::jobs::ScanJobManager;
use crate::metrics::Metrics;
use crate::search::SearchIndex;
use crate::store::{ProjectStore, SettingsStore};

/// The shared application state.
///
/// Exactly one catalog, one index and one job manager exist per running
/// application instance. They are constructed here once at startup and
/// passed by reference to whatever needs them — no ambient singletons, no
/// hidden initialization order, and tests can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// The persisted project catalog.
    pub store: ProjectStore,
    /// The persisted free-form settings document.
    pub settings: SettingsStore,
    /// The in-memory search/filter index over the catalog.
    pub index: SearchIndex,
    /// The scan orchestrator (at most one running scan).
    pub jobs: ScanJobManager,
    /// Git metadata extraction with bounded timeouts.
    pub git: GitClient,
    /// Process-wide counters.
    pub metrics: Metrics,
}

impl AppState {
    /// Opens the stores, builds the index from the loaded catalog and wires
    /// the job manager.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let store =
            ProjectStore::open(config.storage.catalog_path(), config.storage.flush_debounce_ms)
                .await?;
        let settings = SettingsStore::new(config.storage.settings_path());
        let index = SearchIndex::new(config.search.similarity_threshold, config.search.min_query_len);
        index.build_index(store.all().await).await;

        let git = GitClient::new(config.git.timeout_ms);
        let metrics = Metrics::new();
        let jobs = ScanJobManager::new(
            store.clone(),
            index.clone(),
            git.clone(),
            config.scanner.clone(),
            config.scan_defaults.clone(),
            metrics.clone(),
        );

        Ok(Self { config: Arc::new(config), store, settings, index, jobs, git, metrics })
    }
}
