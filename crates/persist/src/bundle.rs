//! SQL synthesis from a declarative table description.
//!
//! A [`TableSpec`] names a table, its (possibly composite) key columns and its
//! mutable columns. [`Bundle::build`] validates it once and produces every
//! statement the CRUD layer needs, each paired with the order in which row
//! fields must be bound. Building is pure: the same spec always yields the
//! same SQL text and bind order.

use crate::error::{ErrorKind, Result};
use crate::executor::Row;
use serde_json::Value;
use std::collections::HashSet;

/// Immutable description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    table: String,
    key_columns: Vec<String>,
    other_columns: Vec<String>,
}

impl TableSpec {
    pub fn new<K, O>(table: impl Into<String>, key_columns: K, other_columns: O) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            table: table.into(),
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            other_columns: other_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn other_columns(&self) -> &[String] {
        &self.other_columns
    }

    /// Key columns followed by the other columns, in declared order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.key_columns.iter().chain(&self.other_columns).map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ErrorKind::InvalidBundle {
            table: self.table.clone(),
            reason,
        };
        if !is_identifier(&self.table) {
            exn::bail!(invalid("table name is not a plain identifier".to_string()));
        }
        if self.key_columns.is_empty() {
            exn::bail!(invalid("at least one key column is required".to_string()));
        }
        if self.other_columns.is_empty() {
            exn::bail!(invalid("at least one non-key column is required".to_string()));
        }
        let mut seen = HashSet::new();
        for column in self.columns() {
            if !is_identifier(column) {
                exn::bail!(invalid(format!("column {column:?} is not a plain identifier")));
            }
            if !seen.insert(column) {
                exn::bail!(invalid(format!("column {column:?} is declared twice")));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// SQL text plus the row fields to bind, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<String>,
}

impl Statement {
    fn new(sql: String, binds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            sql,
            binds: binds.into_iter().map(Into::into).collect(),
        }
    }

    /// Values from `row` in bind order. Missing fields bind as NULL.
    pub fn bindings(&self, row: &Row) -> Vec<Value> {
        self.binds
            .iter()
            .map(|field| match row.get(field) {
                Some(value) => value.clone(),
                None => {
                    tracing::warn!(field = %field, "no value for bound field, binding NULL");
                    Value::Null
                }
            })
            .collect()
    }
}

/// Every statement needed to persist one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    spec: TableSpec,
    pub select_all: Statement,
    pub select_by_key: Statement,
    pub exists: Statement,
    pub insert: Statement,
    pub update: Statement,
    pub delete: Statement,
}

impl Bundle {
    pub fn build(spec: &TableSpec) -> Result<Self> {
        spec.validate()?;
        let table = quote(&spec.table);
        let keys = &spec.key_columns;
        let others = &spec.other_columns;
        let where_keys = keys
            .iter()
            .map(|column| format!("{} = ?", quote(column)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let set_others = others
            .iter()
            .map(|column| format!("{} = ?", quote(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let all_columns = spec.columns().map(quote).collect::<Vec<_>>().join(", ");
        let placeholders = vec!["?"; keys.len() + others.len()].join(", ");

        let bundle = Self {
            select_all: Statement::new(format!("SELECT * FROM {table}"), Vec::<String>::new()),
            select_by_key: Statement::new(format!("SELECT * FROM {table} WHERE {where_keys}"), keys),
            exists: Statement::new(format!("SELECT 1 FROM {table} WHERE {where_keys}"), keys),
            insert: Statement::new(
                format!("INSERT INTO {table} ({all_columns}) VALUES ({placeholders})"),
                spec.columns(),
            ),
            update: Statement::new(
                format!("UPDATE {table} SET {set_others} WHERE {where_keys}"),
                others.iter().chain(keys),
            ),
            delete: Statement::new(format!("DELETE FROM {table} WHERE {where_keys}"), keys),
            spec: spec.clone(),
        };
        tracing::debug!(table = %spec.table, "built SQL bundle");
        Ok(bundle)
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn table(&self) -> &str {
        &self.spec.table
    }

    /// Human readable key of `row`, e.g. `ownerId=o1 & key=k & partNumber=2`.
    pub fn describe_key(&self, row: &Row) -> String {
        self.spec
            .key_columns
            .iter()
            .map(|column| {
                let value = match row.get(column) {
                    None => "undefined".to_string(),
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                };
                format!("{column}={value}")
            })
            .collect::<Vec<_>>()
            .join(" & ")
    }
}
