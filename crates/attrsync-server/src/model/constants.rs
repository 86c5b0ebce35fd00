//! Configuration keys and defaults for the attrsync server

// Server
pub const SERVER_ADDRESS: &str = "server.address";
pub const SERVER_PORT: &str = "server.port";
pub const SERVER_SHUTDOWN_TIMEOUT_SECONDS: &str = "server.shutdown_timeout_seconds";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8090;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

// Backends
pub const SYNC_BACKEND: &str = "sync.backend";
pub const BACKEND_MEMORY: &str = "memory";
pub const BACKEND_HTTP: &str = "http";

// Reconcile
pub const SYNC_GROUP_PREFIX: &str = "sync.group_prefix";
pub const SYNC_APPLICATION_NAME: &str = "sync.application_name";
pub const SYNC_EXTRA_TAGS: &str = "sync.extra_tags";

// Queue
pub const QUEUE_MAX_RETRIES: &str = "queue.max_retries";
pub const QUEUE_VISIBILITY_TIMEOUT_SECONDS: &str = "queue.visibility_timeout_seconds";
pub const QUEUE_REDELIVERY_DELAY_MS: &str = "queue.redelivery_delay_ms";

// Worker
pub const WORKER_CONCURRENCY: &str = "worker.concurrency";
pub const WORKER_RECONCILE_TIMEOUT_SECONDS: &str = "worker.reconcile_timeout_seconds";
pub const WORKER_POLL_WAIT_MS: &str = "worker.poll_wait_ms";

// Periodic reconciler
pub const RECONCILER_ENABLED: &str = "reconciler.enabled";
pub const RECONCILER_INTERVAL_SECONDS: &str = "reconciler.interval_seconds";
pub const RECONCILER_PAGE_SIZE: &str = "reconciler.page_size";
pub const RECONCILER_RUN_ON_START: &str = "reconciler.run_on_start";

// Remote services
pub const STORE_URL: &str = "store.url";
pub const STORE_CONTEXT_PATH: &str = "store.context_path";
pub const STORE_CONNECT_TIMEOUT_MS: &str = "store.connect_timeout_ms";
pub const STORE_READ_TIMEOUT_MS: &str = "store.read_timeout_ms";
pub const REGISTRY_URL: &str = "registry.url";
pub const REGISTRY_CONTEXT_PATH: &str = "registry.context_path";
pub const REGISTRY_CONNECT_TIMEOUT_MS: &str = "registry.connect_timeout_ms";
pub const REGISTRY_READ_TIMEOUT_MS: &str = "registry.read_timeout_ms";

// Logging
pub const LOGS_PATH: &str = "logs.path";
pub const LOGS_CONSOLE: &str = "logs.console";
pub const LOGS_FILE: &str = "logs.file";
pub const LOGS_LEVEL: &str = "logs.level";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ATTRSYNC";
pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
