use std::sync::Arc;

use async_trait::async_trait;
use common::LogPosition;
use tokio::sync::{RwLock, broadcast};

use crate::{
    EventLogError, LogEnvelope, Result,
    log::{EventLog, EventStream},
};

/// In-memory event log for wiring and tests.
///
/// Entries are held sorted by position; live subscribers are fed through a
/// bounded broadcast channel, so a slow consumer lags (and reconciles via
/// backfill) instead of exerting unbounded backpressure on the producer.
#[derive(Clone)]
pub struct InMemoryEventLog {
    entries: Arc<RwLock<Vec<LogEnvelope>>>,
    live: broadcast::Sender<LogEnvelope>,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a log whose live channel buffers `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            live,
        }
    }

    /// Appends an entry and notifies live subscribers.
    ///
    /// Test-side producer hook; the real log is appended elsewhere.
    pub async fn append(&self, envelope: LogEnvelope) {
        self.entries.write().await.push(envelope.clone());
        // No receivers is fine; backfill covers whatever live missed.
        let _ = self.live.send(envelope);
    }

    /// Number of entries in the log.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn head(&self) -> Result<Option<LogPosition>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().map(|e| e.position).max())
    }

    async fn fetch_range(&self, from: LogPosition, to: LogPosition) -> Result<Vec<LogEnvelope>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<_> = entries
            .iter()
            .filter(|e| e.position >= from && e.position <= to)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.position);
        Ok(matched)
    }

    async fn subscribe(&self) -> Result<EventStream> {
        let rx = self.live.subscribe();
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(envelope) => Some((Ok(envelope), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    Some((Err(EventLogError::Lagged { skipped }), rx))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TxHash;
    use futures_util::StreamExt;

    fn entry(block: u64, index: u32) -> LogEnvelope {
        LogEnvelope::builder()
            .event_type("ViolationRecorded")
            .position(LogPosition::new(block, index))
            .tx_hash(TxHash::from_bytes([block as u8; 32]))
            .payload_raw(serde_json::json!({"block": block}))
            .build()
    }

    #[tokio::test]
    async fn head_of_empty_log_is_none() {
        let log = InMemoryEventLog::new();
        assert_eq!(log.head().await.unwrap(), None);
    }

    #[tokio::test]
    async fn head_tracks_newest_entry() {
        let log = InMemoryEventLog::new();
        log.append(entry(1, 0)).await;
        log.append(entry(3, 2)).await;
        log.append(entry(2, 0)).await;
        assert_eq!(log.head().await.unwrap(), Some(LogPosition::new(3, 2)));
    }

    #[tokio::test]
    async fn fetch_range_is_inclusive_and_ordered() {
        let log = InMemoryEventLog::new();
        log.append(entry(3, 0)).await;
        log.append(entry(1, 0)).await;
        log.append(entry(2, 0)).await;
        log.append(entry(2, 1)).await;

        let fetched = log
            .fetch_range(LogPosition::new(2, 0), LogPosition::new(3, 0))
            .await
            .unwrap();
        let positions: Vec<_> = fetched.iter().map(|e| e.position).collect();
        assert_eq!(
            positions,
            vec![
                LogPosition::new(2, 0),
                LogPosition::new(2, 1),
                LogPosition::new(3, 0)
            ]
        );
    }

    #[tokio::test]
    async fn fetch_inverted_range_is_empty() {
        let log = InMemoryEventLog::new();
        log.append(entry(1, 0)).await;
        let fetched = log
            .fetch_range(LogPosition::new(5, 0), LogPosition::new(1, 0))
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn subscribe_sees_entries_appended_after() {
        let log = InMemoryEventLog::new();
        log.append(entry(1, 0)).await;

        let mut stream = log.subscribe().await.unwrap();
        log.append(entry(2, 0)).await;

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.position, LogPosition::new(2, 0));
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_lagged_error() {
        let log = InMemoryEventLog::with_capacity(2);
        let mut stream = log.subscribe().await.unwrap();

        for block in 0..5 {
            log.append(entry(block, 0)).await;
        }

        match stream.next().await.unwrap() {
            Err(EventLogError::Lagged { skipped }) => assert!(skipped > 0),
            other => panic!("expected Lagged, got {other:?}"),
        }
    }
}
