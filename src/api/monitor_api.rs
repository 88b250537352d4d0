//! Monitor API
//!
//! Entry points for hosts embedding the monitor: logging setup, install, and
//! the read/export/delete operations used by list and detail screens.

use anyhow::{anyhow, Context};
use futures::stream::{BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::export::{self, ExportFormat};
use crate::interceptor::{CallInterceptor, MonitoredClient};
use crate::models::{CallFilter, CallRecord};
use crate::retention::RetentionSweeper;
use crate::storage::{self, CallStore, SqliteCallStore};

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize logging (call once at startup).
///
/// Debug builds log to stderr. Release builds write a daily rolling file
/// under `<storage_path>/logs`. Calling it again is harmless.
#[allow(unused_variables)]
pub fn init_logging(storage_path: Option<&Path>) -> anyhow::Result<()> {
    #[cfg(debug_assertions)]
    {
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let level = resolve_log_level();

        let log_dir = storage_path
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| storage::default_storage_dir().join("logs"));
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "http_monitor");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Logging lasts until process exit
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .with_ansi(false)
            .try_init();
    }

    tracing::info!("HTTP monitor initialized v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// An installed monitor: configuration, store and interceptor
#[derive(Clone)]
pub struct HttpMonitor {
    config: Arc<MonitorConfig>,
    store: Arc<dyn CallStore>,
    interceptor: Arc<CallInterceptor>,
}

impl HttpMonitor {
    /// Open the SQLite store under `storage_dir` (or the per-user default),
    /// apply retention once and build the interceptor.
    pub async fn install(
        config: MonitorConfig,
        storage_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let dir = storage_dir.unwrap_or_else(storage::default_storage_dir);
        let store = tokio::task::spawn_blocking(move || SqliteCallStore::open(dir))
            .await
            .context("opening call store")??;
        tracing::info!("Call store opened at {}", store.db_path().display());
        Self::with_store(config, Arc::new(store)).await
    }

    /// Install on top of an existing store
    pub async fn with_store(
        config: MonitorConfig,
        store: Arc<dyn CallStore>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let sweeper = RetentionSweeper::new(Arc::clone(&store), config.retention_period());
        if let Err(err) = sweeper.sweep().await {
            tracing::warn!("Retention sweep failed at install: {:#}", err);
        }

        let interceptor = Arc::new(CallInterceptor::new(
            Arc::clone(&config),
            Arc::clone(&store),
        ));
        Ok(Self {
            config,
            store,
            interceptor,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CallStore> {
        Arc::clone(&self.store)
    }

    pub fn interceptor(&self) -> Arc<CallInterceptor> {
        Arc::clone(&self.interceptor)
    }

    /// Wrap `inner` so every call it makes is recorded
    pub fn client(&self, inner: reqwest::Client) -> MonitoredClient {
        MonitoredClient::new(inner, self.interceptor())
    }

    pub fn show_notification(&self) -> bool {
        self.config.show_notification()
    }

    /// Live list of calls, newest first, without bodies
    pub fn calls(&self, filter: CallFilter) -> BoxStream<'static, Vec<CallRecord>> {
        storage::stream_all(self.store(), filter)
            .map(|calls| calls.into_iter().map(strip_bodies).collect())
            .boxed()
    }

    /// Current list of calls, newest first, without bodies
    pub async fn list(&self, filter: &CallFilter) -> anyhow::Result<Vec<CallRecord>> {
        let calls = self.store.list(filter).await?;
        Ok(calls.into_iter().map(strip_bodies).collect())
    }

    /// Full record for the detail view
    pub async fn call(&self, id: &str) -> anyhow::Result<Option<CallRecord>> {
        self.store.get(id).await
    }

    pub async fn export(&self, id: &str, format: ExportFormat) -> anyhow::Result<String> {
        let call = self.require(id).await?;
        Ok(export::export(&call, format))
    }

    /// Write an export to the share file inside `dir`
    pub async fn export_to_dir(
        &self,
        id: &str,
        format: ExportFormat,
        dir: impl AsRef<Path>,
    ) -> anyhow::Result<PathBuf> {
        let call = self.require(id).await?;
        export::export_to_dir(&call, format, dir).await
    }

    /// Apply the configured retention period now
    pub async fn sweep(&self) -> anyhow::Result<u64> {
        RetentionSweeper::new(self.store(), self.config.retention_period())
            .sweep()
            .await
    }

    pub async fn delete_all(&self) -> anyhow::Result<u64> {
        self.store.delete_all().await
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        self.store.count().await
    }

    async fn require(&self, id: &str) -> anyhow::Result<CallRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Call not found: {}", id))
    }
}

fn strip_bodies(mut call: CallRecord) -> CallRecord {
    call.request_body = None;
    call.response_body = None;
    call
}
