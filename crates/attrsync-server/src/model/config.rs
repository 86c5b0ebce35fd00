//! Configuration management for the attrsync server
//!
//! Settings are layered: `conf/application.yml` first, then `ATTRSYNC_`
//! environment variables (`ATTRSYNC_QUEUE__MAX_RETRIES=3` sets
//! `queue.max_retries`), then command line flags.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};

use attrsync_client::HttpClientConfig;
use attrsync_common::{DEFAULT_APPLICATION_NAME, DEFAULT_GROUP_PREFIX};
use attrsync_core::{QueueConfig, ReconcilerConfig, SyncConfig, WorkerConfig};

use super::constants::*;
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "attrsync-server", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", env = "ATTRSYNC_CONFIG")]
    pub config: Option<String>,
    /// Collaborator backend: memory or http
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,
    #[arg(long = "store-url")]
    pub store_url: Option<String>,
    #[arg(long = "registry-url")]
    pub registry_url: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

/// Where the store and registry live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// In-process store and registry, for demos and local testing
    Memory,
    /// Remote services reached through the HTTP adapters
    Http,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            BACKEND_MEMORY => Ok(Backend::Memory),
            BACKEND_HTTP => Ok(Backend::Http),
            other => Err(anyhow::anyhow!(
                "unknown backend '{}', expected '{}' or '{}'",
                other,
                BACKEND_MEMORY,
                BACKEND_HTTP
            )),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "{}", BACKEND_MEMORY),
            Backend::Http => write!(f, "{}", BACKEND_HTTP),
        }
    }
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process command line
    pub fn new() -> anyhow::Result<Self> {
        Self::load(&Cli::parse())
    }

    pub fn load(args: &Cli) -> anyhow::Result<Self> {
        let path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
        let mut builder = Config::builder()
            .add_source(config::File::with_name(path).required(args.config.is_some()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &args.backend {
            builder = builder.set_override(SYNC_BACKEND, v.as_str())?;
        }
        if let Some(v) = &args.store_url {
            builder = builder.set_override(STORE_URL, v.as_str())?;
        }
        if let Some(v) = &args.registry_url {
            builder = builder.set_override(REGISTRY_URL, v.as_str())?;
        }
        if let Some(v) = args.port {
            builder = builder.set_override(SERVER_PORT, i64::from(v))?;
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build configuration from {}: {}", path, e))?;
        let configuration = Self::from_config(config);
        configuration.validate()?;
        Ok(configuration)
    }

    /// Reject settings that would break per-id exclusivity
    ///
    /// A reconcile must finish, or time out, while its delivery is still
    /// leased. Otherwise the lease expires mid-reconcile and the queue hands
    /// the same id to a second worker task.
    pub fn validate(&self) -> anyhow::Result<()> {
        let visibility = self.queue_config().visibility_timeout;
        let reconcile = self.worker_config().reconcile_timeout;
        if reconcile >= visibility {
            anyhow::bail!(
                "{} ({}s) must be lower than {} ({}s)",
                WORKER_RECONCILE_TIMEOUT_SECONDS,
                reconcile.as_secs(),
                QUEUE_VISIBILITY_TIMEOUT_SECONDS,
                visibility.as_secs()
            );
        }
        Ok(())
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;
        Ok(Self::from_config(config))
    }

    fn int_or(&self, key: &str, default: i64) -> i64 {
        self.config.get_int(key).unwrap_or(default)
    }

    fn uint(&self, key: &str, default: u64) -> u64 {
        u64::try_from(self.int_or(key, default as i64)).unwrap_or(default)
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS)
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        u16::try_from(self.int_or(SERVER_PORT, DEFAULT_SERVER_PORT.into()))
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.uint(
            SERVER_SHUTDOWN_TIMEOUT_SECONDS,
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        ))
    }

    pub fn backend(&self) -> anyhow::Result<Backend> {
        self.config
            .get_string(SYNC_BACKEND)
            .unwrap_or(BACKEND_MEMORY.to_string())
            .parse()
    }

    // ========================================================================
    // Sync Configuration
    // ========================================================================

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            group_prefix: self
                .config
                .get_string(SYNC_GROUP_PREFIX)
                .unwrap_or(DEFAULT_GROUP_PREFIX.to_string()),
            application_name: self
                .config
                .get_string(SYNC_APPLICATION_NAME)
                .unwrap_or(DEFAULT_APPLICATION_NAME.to_string()),
            extra_tags: self
                .config
                .get::<BTreeMap<String, String>>(SYNC_EXTRA_TAGS)
                .unwrap_or_default(),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        let defaults = QueueConfig::default();
        QueueConfig {
            max_retries: u32::try_from(
                self.int_or(QUEUE_MAX_RETRIES, defaults.max_retries.into()),
            )
            .unwrap_or(defaults.max_retries),
            visibility_timeout: Duration::from_secs(self.uint(
                QUEUE_VISIBILITY_TIMEOUT_SECONDS,
                defaults.visibility_timeout.as_secs(),
            )),
            redelivery_delay: Duration::from_millis(self.uint(
                QUEUE_REDELIVERY_DELAY_MS,
                defaults.redelivery_delay.as_millis() as u64,
            )),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let defaults = WorkerConfig::default();
        WorkerConfig {
            concurrency: usize::try_from(
                self.int_or(WORKER_CONCURRENCY, defaults.concurrency as i64),
            )
            .unwrap_or(defaults.concurrency),
            reconcile_timeout: Duration::from_secs(self.uint(
                WORKER_RECONCILE_TIMEOUT_SECONDS,
                defaults.reconcile_timeout.as_secs(),
            )),
            poll_wait: Duration::from_millis(
                self.uint(WORKER_POLL_WAIT_MS, defaults.poll_wait.as_millis() as u64),
            ),
        }
    }

    pub fn reconciler_enabled(&self) -> bool {
        self.config.get_bool(RECONCILER_ENABLED).unwrap_or(true)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let defaults = ReconcilerConfig::default();
        ReconcilerConfig {
            interval: Duration::from_secs(
                self.uint(RECONCILER_INTERVAL_SECONDS, defaults.interval.as_secs())
                    .max(1),
            ),
            page_size: usize::try_from(
                self.int_or(RECONCILER_PAGE_SIZE, defaults.page_size as i64),
            )
            .unwrap_or(defaults.page_size)
            .max(1),
            run_on_start: self
                .config
                .get_bool(RECONCILER_RUN_ON_START)
                .unwrap_or(defaults.run_on_start),
        }
    }

    // ========================================================================
    // Remote Service Configuration
    // ========================================================================

    pub fn store_client_config(&self) -> HttpClientConfig {
        self.client_config(
            STORE_URL,
            STORE_CONTEXT_PATH,
            STORE_CONNECT_TIMEOUT_MS,
            STORE_READ_TIMEOUT_MS,
        )
    }

    pub fn registry_client_config(&self) -> HttpClientConfig {
        self.client_config(
            REGISTRY_URL,
            REGISTRY_CONTEXT_PATH,
            REGISTRY_CONNECT_TIMEOUT_MS,
            REGISTRY_READ_TIMEOUT_MS,
        )
    }

    fn client_config(
        &self,
        url: &str,
        context_path: &str,
        connect: &str,
        read: &str,
    ) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        let base_url = self.config.get_string(url).unwrap_or(defaults.base_url.clone());
        let context_path = self
            .config
            .get_string(context_path)
            .unwrap_or(defaults.context_path.clone());
        HttpClientConfig::new(&base_url)
            .with_context_path(&context_path)
            .with_timeouts(
                self.uint(connect, defaults.connect_timeout_ms),
                self.uint(read, defaults.read_timeout_ms),
            )
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOGS_PATH).ok(),
            self.config.get_bool(LOGS_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOGS_FILE).unwrap_or(true),
            self.config
                .get_string(LOGS_LEVEL)
                .unwrap_or("info".to_string()),
        )
        .merge_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  port: 9100
sync:
  backend: http
  group_prefix: PREFIX
  extra_tags:
    team: platform
queue:
  max_retries: 3
  redelivery_delay_ms: 250
worker:
  concurrency: 2
reconciler:
  enabled: false
  interval_seconds: 600
  page_size: 50
  run_on_start: true
store:
  context_path: /api/v1
registry:
  url: http://registry:8080
  read_timeout_ms: 1500
"#;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.backend().unwrap(), Backend::Memory);
        assert!(configuration.reconciler_enabled());

        let sync = configuration.sync_config();
        assert_eq!(sync.group_prefix, "ATTRSYNC");
        assert_eq!(sync.application_name, "attrsync");
        assert!(sync.extra_tags.is_empty());

        assert_eq!(configuration.queue_config().max_retries, 1);
        assert_eq!(
            configuration.reconciler_config().interval,
            Duration::from_secs(12 * 60 * 60)
        );
    }

    #[test]
    fn test_yaml_values() {
        let configuration = Configuration::from_yaml(SAMPLE).unwrap();
        assert_eq!(configuration.server_port(), 9100);
        assert_eq!(configuration.backend().unwrap(), Backend::Http);

        let sync = configuration.sync_config();
        assert_eq!(sync.group_prefix, "PREFIX");
        assert_eq!(sync.extra_tags["team"], "platform");

        let queue = configuration.queue_config();
        assert_eq!(queue.max_retries, 3);
        assert_eq!(queue.redelivery_delay, Duration::from_millis(250));

        assert_eq!(configuration.worker_config().concurrency, 2);

        assert!(!configuration.reconciler_enabled());
        let reconciler = configuration.reconciler_config();
        assert_eq!(reconciler.interval, Duration::from_secs(600));
        assert_eq!(reconciler.page_size, 50);
        assert!(reconciler.run_on_start);

        let registry = configuration.registry_client_config();
        assert_eq!(registry.base_url, "http://registry:8080");
        assert_eq!(registry.read_timeout_ms, 1500);
        assert_eq!(registry.connect_timeout_ms, 5000);
        assert_eq!(registry.context_path, "");

        let store = configuration.store_client_config();
        assert_eq!(store.context_path, "/api/v1");
        assert_eq!(store.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_reconcile_timeout_must_fit_in_lease() {
        assert!(Configuration::default().validate().is_ok());

        let configuration = Configuration::from_yaml(
            "queue:\n  visibility_timeout_seconds: 1\nworker:\n  reconcile_timeout_seconds: 30\n",
        )
        .unwrap();
        let err = configuration.validate().unwrap_err();
        assert!(err.to_string().contains("worker.reconcile_timeout_seconds"));

        let configuration = Configuration::from_yaml(
            "queue:\n  visibility_timeout_seconds: 30\nworker:\n  reconcile_timeout_seconds: 30\n",
        )
        .unwrap();
        assert!(configuration.validate().is_err());

        let configuration = Configuration::from_yaml(
            "queue:\n  visibility_timeout_seconds: 31\nworker:\n  reconcile_timeout_seconds: 30\n",
        )
        .unwrap();
        assert!(configuration.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = Cli {
            config: Some("does/not/exist.yml".to_string()),
            ..Default::default()
        };
        assert!(Configuration::load(&args).is_err());

        let args = Cli {
            backend: Some("http".to_string()),
            registry_url: Some("http://override:1".to_string()),
            port: Some(7000),
            ..Default::default()
        };
        let configuration = Configuration::load(&args).unwrap();
        assert_eq!(configuration.backend().unwrap(), Backend::Http);
        assert_eq!(
            configuration.registry_client_config().base_url,
            "http://override:1"
        );
        assert_eq!(configuration.server_port(), 7000);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("MEMORY".parse::<Backend>().unwrap(), Backend::Memory);
        assert_eq!(" http ".parse::<Backend>().unwrap(), Backend::Http);
        assert!("sqs".parse::<Backend>().is_err());
        assert_eq!(Backend::Http.to_string(), "http");
    }
}
