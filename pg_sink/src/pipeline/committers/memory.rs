use async_trait::async_trait;
use tracing::trace;

use crate::conversions::deserializer::RawChangeRecord;

use super::{CommitterError, RecordCommitter};

#[derive(Debug, Default, Clone)]
pub struct MemoryCommitter {
    processed: Vec<RawChangeRecord>,
    batches_finished: usize,
}

impl MemoryCommitter {
    pub fn processed(&self) -> &[RawChangeRecord] {
        &self.processed
    }

    pub fn batches_finished(&self) -> usize {
        self.batches_finished
    }
}

#[async_trait]
impl RecordCommitter for MemoryCommitter {
    async fn mark_processed(&mut self, record: &RawChangeRecord) -> Result<(), CommitterError> {
        trace!("processed event for {}", record.destination);
        self.processed.push(record.clone());
        Ok(())
    }

    async fn mark_batch_finished(&mut self) -> Result<(), CommitterError> {
        self.batches_finished += 1;
        Ok(())
    }
}
