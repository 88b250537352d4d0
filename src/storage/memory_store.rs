use crate::models::{CallFilter, CallRecord};
use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use super::{change_channel, CallStore};

/// In-process call store, mostly for tests and hosts without a writable disk
pub struct MemoryCallStore {
    calls: DashMap<String, (u64, CallRecord)>,
    next_seq: AtomicU64,
    changes: broadcast::Sender<()>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        let changes = change_channel();
        Self {
            calls: DashMap::new(),
            next_seq: AtomicU64::new(0),
            changes,
        }
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.changes.send(());
    }
}

impl Default for MemoryCallStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn insert(&self, call: &CallRecord) -> anyhow::Result<()> {
        match self.calls.entry(call.id.clone()) {
            Entry::Occupied(_) => return Err(anyhow!("call {} already exists", call.id)),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, call.clone()));
            }
        }
        self.notify();
        Ok(())
    }

    async fn update(&self, call: &CallRecord) -> anyhow::Result<bool> {
        {
            // The shard lock is held from the pending check through the write
            let Some(mut entry) = self.calls.get_mut(&call.id) else {
                return Ok(false);
            };
            let stored = &mut entry.1;
            if !stored.is_in_progress() {
                return Ok(false);
            }
            stored.protocol = call.protocol.clone();
            stored.response_timestamp = call.response_timestamp;
            stored.response_code = call.response_code;
            stored.response_content_type = call.response_content_type.clone();
            stored.response_headers = call.response_headers.clone();
            stored.response_body = call.response_body.clone();
            stored.is_response_body_truncated = call.is_response_body_truncated;
            stored.response_content_length = call.response_content_length;
            stored.error = call.error.clone();
        }
        self.notify();
        Ok(true)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<CallRecord>> {
        Ok(self.calls.get(id).map(|entry| entry.1.clone()))
    }

    async fn list(&self, filter: &CallFilter) -> anyhow::Result<Vec<CallRecord>> {
        let mut matching: Vec<(u64, CallRecord)> = self
            .calls
            .iter()
            .filter(|entry| filter.matches(&entry.1))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.request_timestamp
                .cmp(&a.request_timestamp)
                .then(seq_b.cmp(seq_a))
        });
        Ok(matching.into_iter().map(|(_, call)| call).collect())
    }

    async fn delete_older_than(&self, threshold_ms: i64) -> anyhow::Result<u64> {
        let before = self.calls.len();
        self.calls
            .retain(|_, (_, call)| call.request_timestamp >= threshold_ms);
        let deleted = before.saturating_sub(self.calls.len()) as u64;
        if deleted > 0 {
            self.notify();
        }
        Ok(deleted)
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let deleted = self.calls.len() as u64;
        self.calls.clear();
        self.notify();
        Ok(deleted)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.calls.len() as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Headers;

    fn call_at(id: &str, ts: i64) -> CallRecord {
        let mut call = CallRecord::new("POST", "https://example.com/upload", Headers::new());
        call.id = id.to_string();
        call.request_timestamp = ts;
        call
    }

    #[tokio::test]
    async fn same_timestamp_lists_latest_insert_first() {
        let store = MemoryCallStore::new();
        store.insert(&call_at("first", 10)).await.unwrap();
        store.insert(&call_at("second", 10)).await.unwrap();
        store.insert(&call_at("older", 5)).await.unwrap();

        let ids: Vec<_> = store
            .list(&CallFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["second", "first", "older"]);
    }

    #[tokio::test]
    async fn update_only_touches_response_side() {
        let store = MemoryCallStore::new();
        let original = call_at("a", 10);
        store.insert(&original).await.unwrap();

        let mut changed = original.clone();
        changed.method = "DELETE".into();
        changed.response_code = Some(500);
        changed.response_timestamp = Some(20);
        assert!(store.update(&changed).await.unwrap());

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.method, "POST");
        assert_eq!(stored.response_code, Some(500));
        assert!(stored.is_terminal());

        changed.response_code = None;
        changed.error = Some("late".into());
        assert!(!store.update(&changed).await.unwrap());
        assert!(!store.update(&call_at("missing", 1)).await.unwrap());
        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.response_code, Some(500));
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn mutations_notify_subscribers() {
        let store = MemoryCallStore::new();
        let mut changes = store.subscribe();
        assert!(changes.try_recv().is_err());

        store.insert(&call_at("a", 1)).await.unwrap();
        assert!(changes.try_recv().is_ok());

        // Nothing old enough: no notification
        assert_eq!(store.delete_older_than(0).await.unwrap(), 0);
        assert!(changes.try_recv().is_err());

        assert_eq!(store.delete_older_than(2).await.unwrap(), 1);
        assert!(changes.try_recv().is_ok());
        assert!(store.insert(&call_at("a", 1)).await.is_ok());
        assert!(store.insert(&call_at("a", 1)).await.is_err());
    }
}
