use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    conversions::{change_event::Document, json_cell::JsonConverter},
    table::{
        schema::SqlType,
        statement::{column_value, CreateTable, PreparedBatch, StatementKind},
        TableId,
    },
};

use super::{Store, StoreError, TableMetadata};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<(String, SqlType)>,
    primary_key: Vec<String>,
    rows: Vec<Document>,
}

impl MemoryTable {
    fn column_type(&self, name: &str) -> Option<&SqlType> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, sql_type)| sql_type)
    }

    fn key_of(&self, row: &Document) -> Vec<Value> {
        self.primary_key
            .iter()
            .map(|k| row.get(k).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<TableId, MemoryTable>,
    catalog_entries: Vec<TableMetadata>,
    ddl: Vec<String>,
    failing_tables: HashSet<String>,
    committed_transactions: usize,
}

/// Store kept in process memory. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn rows(&self, table: &TableId) -> Vec<Document> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn executed_ddl(&self) -> Vec<String> {
        self.state().ddl.clone()
    }

    pub fn committed_transactions(&self) -> usize {
        self.state().committed_transactions
    }

    pub fn fail_writes_to(&self, table_name: impl Into<String>) {
        self.state().failing_tables.insert(table_name.into());
    }

    pub fn register_catalog_entry(&self, meta: TableMetadata) {
        self.state().catalog_entries.push(meta);
    }
}

fn stored_value(value: Option<&Value>, sql_type: &SqlType) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(other) if sql_type.is_text() => Value::String(JsonConverter::to_text(other)),
        Some(other) => other.clone(),
    }
}

fn apply_batch(
    tables: &mut BTreeMap<TableId, MemoryTable>,
    failing_tables: &HashSet<String>,
    batch: &PreparedBatch,
) -> Result<u64, StoreError> {
    let id = batch.statement.table();
    let table = tables
        .get_mut(id)
        .ok_or_else(|| StoreError::UndefinedTable(id.to_string()))?;

    if failing_tables.contains(&id.name) {
        return Err(StoreError::Injected(id.to_string()));
    }

    let mut bound = Vec::with_capacity(batch.statement.columns().len());
    for column in batch.statement.columns() {
        let sql_type = table
            .column_type(&column.name)
            .cloned()
            .ok_or_else(|| StoreError::UndefinedColumn {
                table: id.to_string(),
                column: column.name.clone(),
            })?;
        bound.push((column.name.as_str(), sql_type));
    }

    let mut affected = 0;
    for params in &batch.rows {
        match batch.statement.kind() {
            StatementKind::Insert => {
                let row: Document = bound
                    .iter()
                    .map(|(name, sql_type)| {
                        (name.to_string(), stored_value(column_value(params, name), sql_type))
                    })
                    .collect();

                if !table.primary_key.is_empty() {
                    let key = table.key_of(&row);
                    if table.rows.iter().any(|r| table.key_of(r) == key) {
                        return Err(StoreError::DuplicateKey {
                            table: id.to_string(),
                            key: Value::Array(key).to_string(),
                        });
                    }
                }
                table.rows.push(row);
                affected += 1;
            }
            StatementKind::Delete => {
                let predicate: Vec<(&str, Value)> = bound
                    .iter()
                    .map(|(name, sql_type)| (*name, stored_value(column_value(params, name), sql_type)))
                    .collect();
                // `col = NULL` never matches
                if predicate.iter().any(|(_, v)| v.is_null()) {
                    continue;
                }
                let before = table.rows.len();
                table.rows.retain(|row| {
                    !predicate
                        .iter()
                        .all(|(name, value)| row.get(*name) == Some(value))
                });
                affected += (before - table.rows.len()) as u64;
            }
        }
    }

    Ok(affected)
}

#[async_trait]
impl Store for MemoryStore {
    async fn describe_tables(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<TableMetadata>, StoreError> {
        let state = self.state();
        let mut found: Vec<TableMetadata> = state
            .tables
            .iter()
            .filter(|(id, _)| id.schema == schema && id.name == table)
            .map(|(id, t)| TableMetadata {
                schema: id.schema.clone(),
                name: id.name.clone(),
                columns: t.columns.clone(),
                primary_key: t
                    .primary_key
                    .iter()
                    .enumerate()
                    .map(|(i, k)| (k.clone(), i as i32 + 1))
                    .collect(),
            })
            .collect();
        found.extend(
            state
                .catalog_entries
                .iter()
                .filter(|m| m.schema == schema && m.name == table)
                .cloned(),
        );
        Ok(found)
    }

    async fn create_table(&self, ddl: &CreateTable) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.tables.contains_key(&ddl.table) {
            return Err(StoreError::DuplicateTable(ddl.table.to_string()));
        }

        state.ddl.push(ddl.to_string());
        state.tables.insert(
            ddl.table.clone(),
            MemoryTable {
                columns: ddl
                    .columns
                    .iter()
                    .map(|f| (f.name.clone(), f.column_type.sql_type()))
                    .collect(),
                primary_key: ddl.primary_key.clone(),
                rows: vec![],
            },
        );
        info!("created table {}", ddl.table);
        Ok(())
    }

    async fn execute_batches(&self, batches: &[PreparedBatch]) -> Result<u64, StoreError> {
        let mut state = self.state();
        let MemoryState {
            tables,
            failing_tables,
            committed_transactions,
            ..
        } = &mut *state;

        let snapshot = tables.clone();
        let mut affected = 0;
        for batch in batches {
            match apply_batch(tables, failing_tables, batch) {
                Ok(n) => {
                    debug!("{}: {n} rows", batch.statement);
                    affected += n;
                }
                Err(e) => {
                    warn!("rolling back: {e}");
                    *tables = snapshot;
                    return Err(e);
                }
            }
        }

        *committed_transactions += 1;
        Ok(affected)
    }
}
