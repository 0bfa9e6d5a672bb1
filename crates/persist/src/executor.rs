//! The seam between CRUD logic and the SQL engine.
//!
//! Everything above this module speaks in [`Row`]s and JSON parameter values;
//! everything below it is engine specific. Tests and alternative engines only
//! need to implement the two traits here.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Shared, type-erased executor handed to every table.
pub type ExecutorHandle = Arc<dyn TransactionalExecutor>;

/// Something that can open transactions.
#[async_trait]
pub trait TransactionalExecutor: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>>;
}

/// An open transaction.
///
/// Dropping a handle without calling [`commit`](TransactionHandle::commit)
/// rolls back every statement executed through it.
#[async_trait]
pub trait TransactionHandle: Send {
    /// Execute one parametrized statement and collect every result row.
    ///
    /// Booleans bind as `0`/`1`, arrays and objects bind as JSON text.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Collapse whitespace so multi-line SQL logs on a single line.
pub(crate) fn tidy_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render bound parameters for logs and error frames.
pub(crate) fn describe_parameters(params: &[Value]) -> String {
    Value::Array(params.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tidy_sql() {
        let sql = "\n    SELECT *\n      FROM \"widget\"\n     WHERE \"id\" = ?\n";
        assert_eq!(tidy_sql(sql), r#"SELECT * FROM "widget" WHERE "id" = ?"#);
    }

    #[test]
    fn test_describe_parameters() {
        assert_eq!(describe_parameters(&[json!(1), json!("a"), Value::Null]), r#"[1,"a",null]"#);
    }
}
