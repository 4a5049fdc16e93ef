use thiserror::Error;

use crate::{
    config::SinkConfig,
    conversions::change_event::{ChangeEvent, ChangeEventError},
    table::{TableDescriptor, TableError},
};

use super::stores::{Store, StoreError};

pub mod append;
pub mod upsert;

pub use append::AppendTableWriter;
pub use upsert::UpsertTableWriter;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] ChangeEventError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub enum TableWriter {
    Append(AppendTableWriter),
    Upsert(UpsertTableWriter),
}

impl TableWriter {
    pub fn from_config(config: &SinkConfig) -> TableWriter {
        if config.upsert {
            TableWriter::Upsert(UpsertTableWriter::new(config.upsert_keep_deletes))
        } else {
            TableWriter::Append(AppendTableWriter)
        }
    }

    pub async fn add_to_table<S: Store + ?Sized>(
        &self,
        store: &S,
        table: &TableDescriptor,
        events: &[ChangeEvent],
    ) -> Result<(), WriterError> {
        match self {
            TableWriter::Append(writer) => writer.add_to_table(store, table, events).await,
            TableWriter::Upsert(writer) => writer.add_to_table(store, table, events).await,
        }
    }
}
