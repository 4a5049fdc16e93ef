use committers::CommitterError;
use thiserror::Error;
use writers::WriterError;

use crate::{
    config::ConfigError,
    conversions::change_event::ChangeEventError,
    table::{TableError, TableId},
};

pub mod batch_size_wait;
pub mod batching;
pub mod committers;
pub mod consumer;
pub mod data_pipeline;
pub mod stores;
pub mod writers;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] ChangeEventError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error(
        "table {0} not found, set debezium.format.value.schemas.enable=true \
         to create missing tables automatically"
    )]
    MissingTable(TableId),

    #[error("write error: {0}")]
    Writer(#[from] WriterError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("commit error: {0}")]
    Committer(#[from] CommitterError),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),
}
