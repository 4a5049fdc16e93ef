use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{types::ToSql, NoTls};
use tracing::{debug, error, info, warn};

use crate::{
    config::DatabaseConfig,
    conversions::json_cell::JsonParam,
    table::{
        schema::SqlType,
        statement::{column_value, CreateTable, PreparedBatch},
    },
};

use super::{Store, StoreError, TableMetadata};

const TABLES_QUERY: &str = "SELECT table_schema::text, table_name::text
FROM information_schema.tables
WHERE table_schema::text = $1::text
  AND table_name::text = $2::text
  AND table_type = 'BASE TABLE'";

const COLUMNS_QUERY: &str = "SELECT column_name::text, udt_name::text
FROM information_schema.columns
WHERE table_schema::text = $1::text
  AND table_name::text = $2::text
ORDER BY ordinal_position";

const PRIMARY_KEY_QUERY: &str = "SELECT kcu.column_name::text, kcu.ordinal_position::int4
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema
 AND kcu.constraint_name = tc.constraint_name
 AND kcu.table_name = tc.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND tc.table_schema::text = $1::text
  AND tc.table_name::text = $2::text
ORDER BY kcu.ordinal_position";

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(config: &DatabaseConfig) -> Result<PostgresStore, StoreError> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.dbname)
            .user(&config.username);
        if let Some(ref password) = config.password {
            pg_config.password(password);
        }

        for (name, value) in &config.params {
            match name.as_str() {
                "application_name" => {
                    pg_config.application_name(value);
                }
                "options" => {
                    pg_config.options(value);
                }
                "connect_timeout" => match value.parse() {
                    Ok(secs) => {
                        pg_config.connect_timeout(Duration::from_secs(secs));
                    }
                    Err(_) => warn!("ignoring invalid connect_timeout {value:?}"),
                },
                other => warn!("ignoring unsupported connection parameter {other}"),
            }
        }

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager).max_size(config.pool_size).build()?;

        info!(
            "connecting to postgres at {}:{}/{} as {}",
            config.host, config.port, config.dbname, config.username
        );
        Ok(PostgresStore { pool })
    }

    pub fn from_pool(pool: Pool) -> PostgresStore {
        PostgresStore { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn describe_tables(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<TableMetadata>, StoreError> {
        let client = self.pool.get().await?;

        let mut found = vec![];
        for row in client.query(TABLES_QUERY, &[&schema, &table]).await? {
            let table_schema: String = row.try_get(0)?;
            let table_name: String = row.try_get(1)?;

            let mut columns = vec![];
            for c in client
                .query(COLUMNS_QUERY, &[&table_schema, &table_name])
                .await?
            {
                let name: String = c.try_get(0)?;
                let udt_name: String = c.try_get(1)?;
                columns.push((name, SqlType::from_udt_name(&udt_name)));
            }

            let mut primary_key = vec![];
            for k in client
                .query(PRIMARY_KEY_QUERY, &[&table_schema, &table_name])
                .await?
            {
                let name: String = k.try_get(0)?;
                let position: i32 = k.try_get(1)?;
                primary_key.push((name, position));
            }

            found.push(TableMetadata {
                schema: table_schema,
                name: table_name,
                columns,
                primary_key,
            });
        }

        Ok(found)
    }

    async fn create_table(&self, ddl: &CreateTable) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.batch_execute(&ddl.to_string()).await?;
        Ok(())
    }

    async fn execute_batches(&self, batches: &[PreparedBatch]) -> Result<u64, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let mut affected = 0;
        for batch in batches.iter().filter(|b| !b.is_empty()) {
            let sql = batch.statement.positional_sql();
            let statement = tx.prepare_cached(&sql).await?;
            debug!("executing {} rows: {sql}", batch.len());

            for row in &batch.rows {
                let params: Vec<JsonParam<'_>> = batch
                    .statement
                    .columns()
                    .iter()
                    .map(|c| JsonParam(column_value(row, &c.name)))
                    .collect();
                let refs: Vec<&(dyn ToSql + Sync)> = params
                    .iter()
                    .map(|p| p as &(dyn ToSql + Sync))
                    .collect();

                match tx.execute(&statement, &refs).await {
                    Ok(n) => affected += n,
                    Err(e) => {
                        error!("statement failed, rolling back: {sql}: {e}");
                        return Err(e.into());
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(affected)
    }
}
