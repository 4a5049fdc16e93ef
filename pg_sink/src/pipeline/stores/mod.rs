use async_trait::async_trait;
use thiserror::Error;

use crate::{
    conversions::json_cell::JsonValueConversionError,
    table::{
        schema::SqlType,
        statement::{CreateTable, PreparedBatch},
    },
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("unable to build connection pool: {0}")]
    BuildPool(#[from] deadpool_postgres::BuildError),

    #[error("value conversion error: {0}")]
    Conversion(#[from] JsonValueConversionError),

    #[error("duplicate key {key} violates primary key of {table}")]
    DuplicateKey { table: String, key: String },

    #[error("relation {0} does not exist")]
    UndefinedTable(String),

    #[error("relation {0} already exists")]
    DuplicateTable(String),

    #[error("column {column} of {table} does not exist")]
    UndefinedColumn { table: String, column: String },

    #[error("injected failure for {0}")]
    Injected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub schema: String,
    pub name: String,
    pub columns: Vec<(String, SqlType)>,
    pub primary_key: Vec<(String, i32)>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn describe_tables(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<TableMetadata>, StoreError>;

    async fn create_table(&self, ddl: &CreateTable) -> Result<(), StoreError>;

    async fn execute_batches(&self, batches: &[PreparedBatch]) -> Result<u64, StoreError>;
}
