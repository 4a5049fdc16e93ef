use std::fmt;

use serde_json::Value;

use crate::conversions::change_event::Document;

use super::{
    schema::{SchemaField, SqlType},
    TableId,
};

pub(crate) fn quote_identifier(name: &str, quote: Option<char>) -> String {
    match quote {
        Some(q) => format!("{q}{name}{q}"),
        None => name.to_string(),
    }
}

/// Unquoted identifiers are folded to lower case by the server.
pub(crate) fn fold_identifier(name: &str, quote: Option<char>) -> String {
    match quote {
        Some(_) => name.to_string(),
        None => name.to_ascii_lowercase(),
    }
}

pub fn column_value<'a>(row: &'a Document, column: &str) -> Option<&'a Value> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundColumn {
    pub name: String,
    pub sql_type: SqlType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    kind: StatementKind,
    table: TableId,
    columns: Vec<BoundColumn>,
    quote: Option<char>,
}

impl Statement {
    pub fn insert(table: TableId, columns: Vec<BoundColumn>, quote: Option<char>) -> Self {
        Statement {
            kind: StatementKind::Insert,
            table,
            columns,
            quote,
        }
    }

    pub fn delete(table: TableId, key_columns: Vec<BoundColumn>, quote: Option<char>) -> Self {
        Statement {
            kind: StatementKind::Delete,
            table,
            columns: key_columns,
            quote,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    pub fn columns(&self) -> &[BoundColumn] {
        &self.columns
    }

    pub fn named_sql(&self) -> String {
        self.render(|_, column| format!(":{}", column.name))
    }

    pub fn positional_sql(&self) -> String {
        self.render(|i, column| match &column.sql_type {
            SqlType::Other(type_name) => format!("${}::text::{type_name}", i + 1),
            _ => format!("${}", i + 1),
        })
    }

    fn render(&self, placeholder: impl Fn(usize, &BoundColumn) -> String) -> String {
        let table = self.table.quoted(self.quote);
        match self.kind {
            StatementKind::Insert => {
                let names: Vec<_> = self
                    .columns
                    .iter()
                    .map(|c| quote_identifier(&c.name, self.quote))
                    .collect();
                let values: Vec<_> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| placeholder(i, c))
                    .collect();
                format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    names.join(", "),
                    values.join(", ")
                )
            }
            StatementKind::Delete => {
                let predicates: Vec<_> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        format!("{} = {}", quote_identifier(&c.name, self.quote), placeholder(i, c))
                    })
                    .collect();
                format!("DELETE FROM {table} WHERE {}", predicates.join(" AND "))
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.named_sql())
    }
}

#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub statement: Statement,
    pub rows: Vec<Document>,
}

impl PreparedBatch {
    pub fn new(statement: Statement) -> Self {
        PreparedBatch {
            statement,
            rows: vec![],
        }
    }

    pub fn add(&mut self, row: Document) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: TableId,
    pub columns: Vec<SchemaField>,
    pub primary_key: Vec<String>,
    pub quote: Option<char>,
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    quote_identifier(&c.name, self.quote),
                    c.column_type.ddl_type()
                )
            })
            .collect();

        if !self.primary_key.is_empty() {
            let keys: Vec<_> = self
                .primary_key
                .iter()
                .map(|k| quote_identifier(k, self.quote))
                .collect();
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_identifier(&format!("{}_pkey", self.table.name), self.quote),
                keys.join(", ")
            ));
        }

        write!(
            f,
            "CREATE TABLE {} ({})",
            self.table.quoted(self.quote),
            parts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::schema::ColumnType;

    fn column(name: &str, sql_type: SqlType) -> BoundColumn {
        BoundColumn {
            name: name.to_string(),
            sql_type,
        }
    }

    #[test]
    fn column_values_fall_back_to_case_insensitive_match() {
        let row: Document = serde_json::from_value(serde_json::json!({
            "firstName": "Sally",
            "firstname": "exact",
            "Id": 1
        }))
        .unwrap();

        assert_eq!(column_value(&row, "firstname"), Some(&Value::from("exact")));
        assert_eq!(column_value(&row, "id"), Some(&Value::from(1)));
        assert_eq!(column_value(&row, "missing"), None);
        assert_eq!(fold_identifier("Customers", None), "customers");
        assert_eq!(fold_identifier("Customers", Some('"')), "Customers");
    }

    #[test]
    fn positional_rendering_casts_unbound_types() {
        let stmt = Statement::insert(
            TableId::new("public", "orders"),
            vec![
                column("amount", SqlType::Other("numeric".to_string())),
                column("id", SqlType::BigInt),
            ],
            None,
        );
        assert_eq!(
            stmt.named_sql(),
            "INSERT INTO public.orders (amount, id) VALUES (:amount, :id)"
        );
        assert_eq!(
            stmt.positional_sql(),
            "INSERT INTO public.orders (amount, id) VALUES ($1::text::numeric, $2)"
        );
    }

    #[test]
    fn quoting_applies_to_every_identifier() {
        let stmt = Statement::delete(
            TableId::new("public", "orders"),
            vec![column("id", SqlType::BigInt), column("Region", SqlType::Text)],
            Some('"'),
        );
        assert_eq!(
            stmt.to_string(),
            r#"DELETE FROM "public"."orders" WHERE "id" = :id AND "Region" = :Region"#
        );
        assert_eq!(
            stmt.positional_sql(),
            r#"DELETE FROM "public"."orders" WHERE "id" = $1 AND "Region" = $2"#
        );
    }

    #[test]
    fn create_table_lists_columns_then_key() {
        let ddl = CreateTable {
            table: TableId::new("debezium", "inventory_customers"),
            columns: vec![
                SchemaField {
                    name: "id".to_string(),
                    column_type: ColumnType::Int32,
                },
                SchemaField {
                    name: "first_name".to_string(),
                    column_type: ColumnType::String,
                },
            ],
            primary_key: vec!["id".to_string()],
            quote: None,
        };
        assert_eq!(
            ddl.to_string(),
            "CREATE TABLE debezium.inventory_customers (id INTEGER, first_name TEXT, \
             CONSTRAINT inventory_customers_pkey PRIMARY KEY (id))"
        );
    }
}
