//! Wiring of the synchronizer components
//!
//! Builds the store and registry for the configured backend, then the queue,
//! reconciler, worker and periodic reconciler on top of them, and spawns the
//! background loops.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use attrsync_client::{HttpAttributeStore, HttpRegistryClient};
use attrsync_common::{AttributeStore, RegistryClient, SyncQueue};
use attrsync_core::{
    Enqueuer, MemoryAttributeStore, MemoryRegistry, MemorySyncQueue, PeriodicReconciler,
    Reconciler, SyncWorker,
};

use super::ShutdownSignal;
use crate::model::{Backend, Configuration};

/// The assembled synchronizer
pub struct SyncComponents {
    pub queue: Arc<dyn SyncQueue>,
    pub enqueuer: Enqueuer,
    pub worker: Arc<SyncWorker>,
    pub periodic: Arc<PeriodicReconciler>,
    pub reconciler_enabled: bool,
}

impl SyncComponents {
    pub fn build(configuration: &Configuration) -> anyhow::Result<Self> {
        configuration.validate()?;
        let backend = configuration.backend()?;
        let (store, registry): (Arc<dyn AttributeStore>, Arc<dyn RegistryClient>) =
            match backend {
                Backend::Memory => (
                    Arc::new(MemoryAttributeStore::new()),
                    Arc::new(MemoryRegistry::new()),
                ),
                Backend::Http => {
                    let store_config = configuration.store_client_config();
                    let registry_config = configuration.registry_client_config();
                    info!(
                        "Using attribute store at {} and registry at {}",
                        store_config.base_url, registry_config.base_url
                    );
                    (
                        Arc::new(HttpAttributeStore::new(&store_config)?),
                        Arc::new(HttpRegistryClient::new(&registry_config)?),
                    )
                }
            };
        info!("Synchronizer backend: {}", backend);

        Self::with_collaborators(configuration, store, registry)
    }

    /// Assemble around explicit collaborators
    pub fn with_collaborators(
        configuration: &Configuration,
        store: Arc<dyn AttributeStore>,
        registry: Arc<dyn RegistryClient>,
    ) -> anyhow::Result<Self> {
        configuration.validate()?;
        let queue: Arc<dyn SyncQueue> =
            Arc::new(MemorySyncQueue::new(configuration.queue_config()));
        let enqueuer = Enqueuer::new(queue.clone());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            registry,
            configuration.sync_config(),
        ));
        let worker = Arc::new(SyncWorker::new(
            queue.clone(),
            reconciler,
            configuration.worker_config(),
        ));
        let periodic = Arc::new(PeriodicReconciler::new(
            store,
            enqueuer.clone(),
            configuration.reconciler_config(),
        ));

        Ok(Self {
            queue,
            enqueuer,
            worker,
            periodic,
            reconciler_enabled: configuration.reconciler_enabled(),
        })
    }

    /// Start the worker loop and, when enabled, the periodic reconciler
    pub fn spawn(&self, shutdown: &ShutdownSignal) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        let worker = self.worker.clone();
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move { worker.run(rx).await }));

        if self.reconciler_enabled {
            let periodic = self.periodic.clone();
            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move { periodic.run(rx).await }));
        } else {
            info!("Periodic reconciler disabled");
        }

        tasks
    }
}
