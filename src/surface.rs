//! Relational execution surface.
//!
//! One MySQL connection per migration invocation, wrapped behind the
//! [`SqlSurface`] trait so batch logic can run against a scripted mock in
//! tests. Row values are decoded per the source-reported column type and
//! re-bound as parameters on insert; literal values are never interpolated
//! into SQL text.

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};

use crate::config::DbEnv;
use crate::error::{DriftError, DriftResult};

/// Dynamic value for row seeding, typed from the source column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// A fetched table: column names plus rows in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// The connect / query / transaction operations the migration executor
/// needs from a destination database.
pub trait SqlSurface {
    /// Execute one statement, returning affected rows.
    async fn execute(&mut self, sql: &str) -> DriftResult<u64>;
    /// Execute a parameterized statement with bound values.
    async fn insert_row(&mut self, sql: &str, params: &[SqlValue]) -> DriftResult<u64>;
    /// Catalog probe for table existence. Never creates anything.
    async fn table_exists(&mut self, table: &str) -> DriftResult<bool>;
    async fn count_rows(&mut self, table: &str) -> DriftResult<u64>;
    async fn fetch_table(&mut self, table: &str) -> DriftResult<TableRows>;
    async fn begin(&mut self) -> DriftResult<()>;
    async fn commit(&mut self) -> DriftResult<()>;
    async fn rollback(&mut self) -> DriftResult<()>;
    async fn close(self) -> DriftResult<()>;
}

/// A single live MySQL connection, not pooled.
pub struct MySqlSurface {
    conn: MySqlConnection,
    database: String,
}

impl MySqlSurface {
    /// Open one connection from environment parameters.
    pub async fn connect(env: &DbEnv) -> DriftResult<Self> {
        let options = MySqlConnectOptions::new()
            .host(&env.host)
            .port(env.port)
            .username(&env.user)
            .password(&env.password)
            .database(&env.database);
        let conn = options
            .connect()
            .await
            .map_err(|e| DriftError::Connection(e.to_string()))?;
        Ok(Self {
            conn,
            database: env.database.clone(),
        })
    }
}

impl SqlSurface for MySqlSurface {
    async fn execute(&mut self, sql: &str) -> DriftResult<u64> {
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| DriftError::Execution(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn insert_row(&mut self, sql: &str, params: &[SqlValue]) -> DriftResult<u64> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = match value {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Uint(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::String(v) => query.bind(v.clone()),
                SqlValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        let result = query
            .execute(&mut self.conn)
            .await
            .map_err(|e| DriftError::Execution(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&mut self, table: &str) -> DriftResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_one(&mut self.conn)
        .await
        .map_err(|e| DriftError::Execution(e.to_string()))?;
        Ok(count > 0)
    }

    async fn count_rows(&mut self, table: &str) -> DriftResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM `{table}`"))
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| DriftError::Execution(e.to_string()))?;
        Ok(count as u64)
    }

    async fn fetch_table(&mut self, table: &str) -> DriftResult<TableRows> {
        let rows: Vec<MySqlRow> = sqlx::query(&format!("SELECT * FROM `{table}`"))
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DriftError::Execution(e.to_string()))?;

        let mut out = TableRows::default();
        if let Some(first) = rows.first() {
            out.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
        }
        for row in &rows {
            out.rows.push(decode_row(row)?);
        }
        Ok(out)
    }

    async fn begin(&mut self) -> DriftResult<()> {
        sqlx::query("START TRANSACTION")
            .execute(&mut self.conn)
            .await
            .map_err(|e| DriftError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn commit(&mut self) -> DriftResult<()> {
        sqlx::query("COMMIT")
            .execute(&mut self.conn)
            .await
            .map_err(|e| DriftError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn rollback(&mut self) -> DriftResult<()> {
        sqlx::query("ROLLBACK")
            .execute(&mut self.conn)
            .await
            .map_err(|e| DriftError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn close(self) -> DriftResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DriftError::Connection(e.to_string()))
    }
}

/// Decode one row into [`SqlValue`]s by the column's reported type.
fn decode_row(row: &MySqlRow) -> DriftResult<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| DriftError::Execution(e.to_string()))?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOLEAN" => row
                .try_get::<bool, _>(i)
                .map(SqlValue::Bool)
                .unwrap_or(SqlValue::Null),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<i64, _>(i)
                .map(SqlValue::Int)
                .unwrap_or(SqlValue::Null),
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row
                .try_get::<u64, _>(i)
                .map(SqlValue::Uint)
                .unwrap_or(SqlValue::Null),
            "FLOAT" | "DOUBLE" => row
                .try_get::<f64, _>(i)
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Null),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(i)
                .map(|v| SqlValue::String(v.format("%Y-%m-%d").to_string()))
                .unwrap_or(SqlValue::Null),
            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(i)
                .map(|v| SqlValue::String(v.format("%H:%M:%S%.f").to_string()))
                .unwrap_or(SqlValue::Null),
            "DATETIME" => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .map(|v| SqlValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(SqlValue::Null),
            "TIMESTAMP" => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .map(|v| SqlValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(SqlValue::Null),
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
                .try_get::<Vec<u8>, _>(i)
                .map(SqlValue::Bytes)
                .unwrap_or(SqlValue::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(SqlValue::String)
                .unwrap_or(SqlValue::Null),
        };
        values.push(value);
    }
    Ok(values)
}

/// Build a parameterized INSERT for one table's column list.
pub fn insert_statement(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO `{table}` ({column_list}) VALUES ({placeholders})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_statement() {
        let sql = insert_statement("orders", &["id".to_string(), "total".to_string()]);
        assert_eq!(sql, "INSERT INTO `orders` (`id`, `total`) VALUES (?, ?)");
    }

    #[test]
    fn test_sql_value_variants() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Int(-1),
            SqlValue::Uint(7),
            SqlValue::String("x".into()),
        ];
        assert_eq!(values.len(), 4);
        assert_ne!(SqlValue::Int(1), SqlValue::Uint(1));
    }
}
