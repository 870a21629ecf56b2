//! Shared application state for the mcpshield server.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use mcpshield_core::batch::{BatchProcessor, MirrorClient};
use mcpshield_core::config::EngineConfig;
use mcpshield_core::policy::PolicyStoreClient;
use mcpshield_core::storage::{KvStore, MemoryKvStore};
use mcpshield_core::validate::PolicyValidator;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// Engine configuration read from the environment.
    pub config: EngineConfig,
    /// Policy store client; bundles are fetched per call or per batch.
    pub store: PolicyStoreClient,
    /// The validation orchestrator.
    pub validator: Arc<PolicyValidator>,
    /// Batch processor for `/api/ingestData`.
    pub batch: BatchProcessor,
    /// Mirror tee for ingested batches, when configured.
    pub mirror: Option<MirrorClient>,
    /// Tracker for detached work (threat reports, metadata audits, mirror
    /// tees); drained on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    /// Wire the full engine from one configuration.
    ///
    /// The bundled in-memory KV store backs the rate limiter; deployments
    /// sharing state across processes swap in their own [`KvStore`].
    pub fn from_config(config: EngineConfig) -> Self {
        let tasks = TaskTracker::new();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let store = PolicyStoreClient::new(
            config.policy_store_url.clone(),
            config.policy_store_token.clone(),
        );
        let validator = Arc::new(PolicyValidator::from_config(&config, Some(kv)));
        let batch = BatchProcessor::new(store.clone(), Arc::clone(&validator), tasks.clone());
        let mirror = config.mirror_url.clone().map(MirrorClient::new);

        Self {
            config,
            store,
            validator,
            batch,
            mirror,
            tasks,
        }
    }
}
