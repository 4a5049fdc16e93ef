use std::{collections::BTreeMap, fmt};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    conversions::change_event::EventSchema,
    pipeline::stores::{Store, StoreError},
};

use schema::{SchemaError, SchemaField, SqlType};
use statement::{fold_identifier, quote_identifier, BoundColumn, CreateTable, Statement};

pub mod schema;
pub mod statement;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table {0} not found")]
    NotFound(TableId),

    #[error("found {count} tables named {table}, expecting 1")]
    Ambiguous { table: TableId, count: usize },

    #[error("can't delete from table {0} without a primary key")]
    NoPrimaryKey(TableId),

    #[error("can't create table {0}: event has no value schema")]
    NoSchema(TableId),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    pub schema: String,
    pub name: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableId {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn quoted(&self, quote: Option<char>) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema, quote),
            quote_identifier(&self.name, quote)
        )
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    id: TableId,
    columns: BTreeMap<String, SqlType>,
    primary_key: BTreeMap<String, i32>,
    quote: Option<char>,
}

impl TableDescriptor {
    pub fn new(
        id: TableId,
        columns: impl IntoIterator<Item = (String, SqlType)>,
        primary_key: impl IntoIterator<Item = (String, i32)>,
    ) -> Self {
        TableDescriptor {
            id,
            columns: columns.into_iter().collect(),
            primary_key: primary_key.into_iter().collect(),
            quote: None,
        }
    }

    pub fn with_identifier_quote(mut self, quote: Option<char>) -> Self {
        self.quote = quote;
        self
    }

    pub async fn resolve<S: Store + ?Sized>(
        store: &S,
        id: &TableId,
    ) -> Result<TableDescriptor, TableError> {
        let mut tables = store.describe_tables(&id.schema, &id.name).await?;

        match tables.len() {
            0 => Err(TableError::NotFound(id.clone())),
            1 => {
                let meta = tables.remove(0);
                info!(
                    "loaded table {}.{} columns: {:?} pk: {:?}",
                    meta.schema, meta.name, meta.columns, meta.primary_key
                );
                Ok(TableDescriptor::new(
                    TableId::new(meta.schema, meta.name),
                    meta.columns,
                    meta.primary_key,
                ))
            }
            count => Err(TableError::Ambiguous {
                table: id.clone(),
                count,
            }),
        }
    }

    pub async fn create_table<S: Store + ?Sized>(
        store: &S,
        id: &TableId,
        schema: &EventSchema,
        quote: Option<char>,
    ) -> Result<(), TableError> {
        let columns: Vec<SchemaField> = schema
            .value_fields()?
            .into_iter()
            .map(|f| SchemaField {
                name: fold_identifier(&f.name, quote),
                column_type: f.column_type,
            })
            .collect();
        if columns.is_empty() {
            return Err(TableError::NoSchema(id.clone()));
        }
        let primary_key = schema
            .key_fields()?
            .into_iter()
            .map(|f| fold_identifier(&f.name, quote))
            .collect();

        let ddl = CreateTable {
            table: id.clone(),
            columns,
            primary_key,
            quote,
        };
        info!("creating table: {ddl}");
        store.create_table(&ddl).await?;
        Ok(())
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn columns(&self) -> &BTreeMap<String, SqlType> {
        &self.columns
    }

    pub fn primary_key(&self) -> &BTreeMap<String, i32> {
        &self.primary_key
    }

    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn key_columns(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.primary_key.iter().collect();
        keys.sort_by(|(a_name, a_pos), (b_name, b_pos)| {
            a_pos.cmp(b_pos).then_with(|| a_name.cmp(b_name))
        });
        keys.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn insert_statement(&self) -> Statement {
        let columns = self
            .columns
            .iter()
            .map(|(name, sql_type)| BoundColumn {
                name: name.clone(),
                sql_type: sql_type.clone(),
            })
            .collect();
        Statement::insert(self.id.clone(), columns, self.quote)
    }

    pub fn delete_statement(&self) -> Result<Statement, TableError> {
        if !self.has_pk() {
            return Err(TableError::NoPrimaryKey(self.id.clone()));
        }

        let columns = self
            .key_columns()
            .into_iter()
            .map(|name| BoundColumn {
                name: name.to_string(),
                sql_type: self
                    .columns
                    .get(name)
                    .cloned()
                    .unwrap_or(SqlType::Text),
            })
            .collect();
        let statement = Statement::delete(self.id.clone(), columns, self.quote);
        debug!("delete statement for {}: {statement}", self.id);
        Ok(statement)
    }

    pub fn prepared_insert_statement(&self) -> String {
        self.insert_statement().named_sql()
    }

    pub fn prepared_delete_statement(&self) -> Result<String, TableError> {
        Ok(self.delete_statement()?.named_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stores::{memory::MemoryStore, TableMetadata};
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<(String, SqlType)> {
        names
            .iter()
            .map(|n| (n.to_string(), SqlType::Text))
            .collect()
    }

    fn without_pk() -> TableDescriptor {
        TableDescriptor::new(
            TableId::new("public", "tbl_without_pk"),
            columns(&["coll3", "coll2", "coll1", "id", "coll4"]),
            vec![],
        )
    }

    fn with_pk() -> TableDescriptor {
        TableDescriptor::new(
            TableId::new("public", "tbl_with_pk"),
            columns(&["coll3", "coll2", "coll1", "id", "coll4"]),
            vec![("id".to_string(), 1), ("coll1".to_string(), 2)],
        )
    }

    #[test]
    fn insert_statement_is_deterministic() {
        let table = without_pk();
        let expected =
            "INSERT INTO public.tbl_without_pk (coll1, coll2, coll3, coll4, id) \
             VALUES (:coll1, :coll2, :coll3, :coll4, :id)";
        assert_eq!(table.prepared_insert_statement(), expected);
        assert_eq!(table.prepared_insert_statement(), expected);
        assert_eq!(
            with_pk().prepared_insert_statement(),
            "INSERT INTO public.tbl_with_pk (coll1, coll2, coll3, coll4, id) \
             VALUES (:coll1, :coll2, :coll3, :coll4, :id)"
        );
    }

    #[test]
    fn delete_statement_ands_key_columns() {
        assert_eq!(
            with_pk().prepared_delete_statement().unwrap(),
            "DELETE FROM public.tbl_with_pk WHERE id = :id AND coll1 = :coll1"
        );
        assert!(matches!(
            without_pk().prepared_delete_statement(),
            Err(TableError::NoPrimaryKey(id)) if id.name == "tbl_without_pk"
        ));
    }

    #[test]
    fn has_pk_reflects_key_set() {
        assert!(with_pk().has_pk());
        assert!(!without_pk().has_pk());
    }

    #[tokio::test]
    async fn resolve_reports_missing_and_ambiguous_tables() {
        let store = MemoryStore::default();
        let id = TableId::new("debezium", "customers");

        assert!(matches!(
            TableDescriptor::resolve(&store, &id).await,
            Err(TableError::NotFound(_))
        ));

        let meta = TableMetadata {
            schema: "debezium".to_string(),
            name: "customers".to_string(),
            columns: columns(&["id"]),
            primary_key: vec![],
        };
        store.register_catalog_entry(meta.clone());
        store.register_catalog_entry(meta);
        assert!(matches!(
            TableDescriptor::resolve(&store, &id).await,
            Err(TableError::Ambiguous { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn create_then_resolve() {
        let store = MemoryStore::default();
        let id = TableId::new("debezium", "customers");
        let schema = EventSchema::new(
            Some(json!({"type": "struct", "fields": [
                {"field": "id", "type": "int64"},
                {"field": "name", "type": "string"},
                {"field": "tags", "type": "array", "items": {"type": "string"}},
            ]})),
            Some(json!({"type": "struct", "fields": [{"field": "id", "type": "int64"}]})),
        );

        TableDescriptor::create_table(&store, &id, &schema, None)
            .await
            .unwrap();
        let table = TableDescriptor::resolve(&store, &id).await.unwrap();

        assert_eq!(table.key_columns(), vec!["id"]);
        assert_eq!(table.columns().get("id"), Some(&SqlType::BigInt));
        assert_eq!(table.columns().get("tags"), Some(&SqlType::Text));
        assert_eq!(
            store.executed_ddl(),
            vec!["CREATE TABLE debezium.customers (id BIGINT, name TEXT, tags TEXT, \
                  CONSTRAINT customers_pkey PRIMARY KEY (id))"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn unquoted_column_names_are_folded_to_lower_case() {
        let schema = EventSchema::new(
            Some(json!({"type": "struct", "fields": [
                {"field": "Id", "type": "int64"},
                {"field": "firstName", "type": "string"},
            ]})),
            Some(json!({"type": "struct", "fields": [{"field": "Id", "type": "int64"}]})),
        );

        let store = MemoryStore::default();
        let id = TableId::new("debezium", "customers");
        TableDescriptor::create_table(&store, &id, &schema, None)
            .await
            .unwrap();
        let table = TableDescriptor::resolve(&store, &id).await.unwrap();
        assert_eq!(table.key_columns(), vec!["id"]);
        assert!(table.columns().contains_key("firstname"));

        let store = MemoryStore::default();
        TableDescriptor::create_table(&store, &id, &schema, Some('"'))
            .await
            .unwrap();
        let table = TableDescriptor::resolve(&store, &id).await.unwrap();
        assert_eq!(table.key_columns(), vec!["Id"]);
        assert!(table.columns().contains_key("firstName"));
    }

    #[tokio::test]
    async fn create_without_value_schema_fails() {
        let store = MemoryStore::default();
        let id = TableId::new("debezium", "customers");
        let err = TableDescriptor::create_table(&store, &id, &EventSchema::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::NoSchema(_)));
        assert!(store.executed_ddl().is_empty());
    }
}
