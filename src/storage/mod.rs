//! Call record storage
//!
//! `CallStore` is the persistence seam used by the interceptor, the retention
//! sweeper and the presentation layer. Every operation is atomic on its own;
//! nothing spans several records in one transaction.

mod call_store;
mod memory_store;

pub use call_store::SqliteCallStore;
pub use memory_store::MemoryCallStore;

use crate::models::{CallFilter, CallRecord};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

const STORAGE_DIR_NAME: &str = "http_monitor";
const CHANGE_CHANNEL_CAPACITY: usize = 64;

fn change_channel() -> broadcast::Sender<()> {
    let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    tx
}

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Persist a new pending record. Fails if the id already exists.
    async fn insert(&self, call: &CallRecord) -> anyhow::Result<()>;

    /// Write the response-side fields of a record that is still pending.
    ///
    /// The pending check and the write happen as one step. Returns `false`
    /// when the record is missing or already completed; nothing is written.
    async fn update(&self, call: &CallRecord) -> anyhow::Result<bool>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<CallRecord>>;

    /// Matching records, newest first
    async fn list(&self, filter: &CallFilter) -> anyhow::Result<Vec<CallRecord>>;

    /// Delete records whose request timestamp is strictly before `threshold_ms`
    async fn delete_older_than(&self, threshold_ms: i64) -> anyhow::Result<u64>;

    async fn delete_all(&self) -> anyhow::Result<u64>;

    async fn count(&self) -> anyhow::Result<u64>;

    /// Notified after every mutation
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Live view of the store: yields the current snapshot right away and a fresh
/// one after every mutation.
pub fn stream_all(
    store: Arc<dyn CallStore>,
    filter: CallFilter,
) -> BoxStream<'static, Vec<CallRecord>> {
    let changes = store.subscribe();
    stream::unfold(
        (store, changes, filter, true),
        |(store, mut changes, filter, first)| async move {
            if !first {
                match changes.recv().await {
                    Ok(()) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return None,
                }
                // One snapshot covers every mutation queued so far
                while let Ok(()) | Err(TryRecvError::Lagged(_)) = changes.try_recv() {}
            }
            let snapshot = match store.list(&filter).await {
                Ok(calls) => calls,
                Err(err) => {
                    tracing::warn!("Failed to load calls for live stream: {}", err);
                    Vec::new()
                }
            };
            Some((snapshot, (store, changes, filter, false)))
        },
    )
    .boxed()
}

/// Per-user data directory used when the host does not pick one
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STORAGE_DIR_NAME)
}
