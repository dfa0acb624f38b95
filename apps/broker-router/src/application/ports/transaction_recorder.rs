//! Transaction Recorder Port (Driven Port)
//!
//! Callbacks invoked by adapters after every place/modify/cancel/close.
//! Recorder failures never reach the caller of the broker operation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::order_execution::TransactionRecord;

/// Recorder failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Transaction recorder failed: {message}")]
pub struct RecorderError {
    /// Error details.
    pub message: String,
}

impl RecorderError {
    /// Create a recorder error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Sink for normalized transaction records.
#[async_trait]
pub trait TransactionRecorder: Send + Sync {
    /// Persist or forward one record.
    async fn record(&self, record: &TransactionRecord) -> Result<(), RecorderError>;
}

/// Fan-out over registered recorders.
#[derive(Default, Clone)]
pub struct TransactionRecorders {
    recorders: Arc<RwLock<Vec<Arc<dyn TransactionRecorder>>>>,
}

impl std::fmt::Debug for TransactionRecorders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRecorders")
            .field("count", &self.len())
            .finish()
    }
}

impl TransactionRecorders {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recorder.
    pub fn add(&self, recorder: Arc<dyn TransactionRecorder>) {
        self.recorders.write().push(recorder);
    }

    /// Number of registered recorders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorders.read().len()
    }

    /// Returns true if no recorder is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorders.read().is_empty()
    }

    /// Hand the record to every recorder in registration order.
    /// Failures are logged and swallowed.
    pub async fn notify(&self, record: &TransactionRecord) {
        let recorders: Vec<Arc<dyn TransactionRecorder>> = self.recorders.read().clone();
        for recorder in recorders {
            if let Err(e) = recorder.record(record).await {
                tracing::warn!(
                    broker = %record.broker,
                    transaction_id = %record.transaction_id,
                    kind = ?record.kind,
                    error = %e,
                    "Transaction recorder failed"
                );
            }
        }
    }
}

/// Records retained by [`InMemoryTransactionRecorder::new`].
pub const DEFAULT_RECORDER_CAPACITY: usize = 10_000;

/// Recorder that keeps the most recent records in memory.
#[derive(Debug)]
pub struct InMemoryTransactionRecorder {
    capacity: usize,
    records: RwLock<VecDeque<TransactionRecord>>,
}

impl Default for InMemoryTransactionRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECORDER_CAPACITY)
    }
}

impl InMemoryTransactionRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder retaining at most `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().iter().cloned().collect()
    }
}

#[async_trait]
impl TransactionRecorder for InMemoryTransactionRecorder {
    async fn record(&self, record: &TransactionRecord) -> Result<(), RecorderError> {
        let mut records = self.records.write();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::TransactionKind;

    struct FailingRecorder;

    #[async_trait]
    impl TransactionRecorder for FailingRecorder {
        async fn record(&self, _record: &TransactionRecord) -> Result<(), RecorderError> {
            Err(RecorderError::new("disk full"))
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_later_recorders_still_run() {
        let recorders = TransactionRecorders::new();
        let memory = Arc::new(InMemoryTransactionRecorder::new());
        recorders.add(Arc::new(FailingRecorder));
        recorders.add(memory.clone());

        let record = TransactionRecord::new("paper", TransactionKind::OrderPlaced);
        recorders.notify(&record).await;

        assert_eq!(recorders.len(), 2);
        assert_eq!(memory.records(), vec![record]);
    }

    #[tokio::test]
    async fn in_memory_recorder_keeps_most_recent() {
        let memory = InMemoryTransactionRecorder::with_capacity(2);
        let records: Vec<TransactionRecord> = [
            TransactionKind::OrderPlaced,
            TransactionKind::OrderModified,
            TransactionKind::OrderCancelled,
        ]
        .into_iter()
        .map(|kind| TransactionRecord::new("paper", kind))
        .collect();

        for record in &records {
            memory.record(record).await.unwrap();
        }

        assert_eq!(memory.records(), records[1..].to_vec());
    }
}
