use async_trait::async_trait;
use thiserror::Error;

use crate::conversions::deserializer::RawChangeRecord;

pub mod memory;

#[derive(Debug, Error)]
#[error("committer error: {0}")]
pub struct CommitterError(pub String);

#[async_trait]
pub trait RecordCommitter: Send {
    async fn mark_processed(&mut self, record: &RawChangeRecord) -> Result<(), CommitterError>;

    async fn mark_batch_finished(&mut self) -> Result<(), CommitterError>;
}
