//! Typed data model for schema objects and classification state.
//!
//! Statuses and object types are closed enums so the migration routing
//! table can be matched exhaustively instead of comparing strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Table names with this prefix are partition shards and are never created
/// by table migration.
pub const PARTITION_PREFIX: &str = "pt_";

/// Objects with this prefix are marked do-not-migrate.
pub const NO_MIGRATE_PREFIX: &str = "zz_";

/// Kind of schema object the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DdlType {
    Table,
    Function,
    Procedure,
    Trigger,
}

impl DdlType {
    /// All tracked object types, in compare order.
    pub const ALL: [DdlType; 4] = [
        DdlType::Table,
        DdlType::Function,
        DdlType::Procedure,
        DdlType::Trigger,
    ];

    pub fn is_routine(&self) -> bool {
        matches!(self, DdlType::Function | DdlType::Procedure)
    }

    /// The SQL object keyword used in DROP/CREATE statements.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            DdlType::Table => "TABLE",
            DdlType::Function => "FUNCTION",
            DdlType::Procedure => "PROCEDURE",
            DdlType::Trigger => "TRIGGER",
        }
    }
}

impl fmt::Display for DdlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DdlType::Table => "table",
            DdlType::Function => "function",
            DdlType::Procedure => "procedure",
            DdlType::Trigger => "trigger",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of an object relative to a source/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Present only at the source.
    New,
    /// Present on both sides with differing normalized DDL.
    Updated,
    /// Present only at the destination.
    Deprecated,
    /// Overridable teardown list for non-production environments.
    Ote,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::New => "new",
            Status::Updated => "updated",
            Status::Deprecated => "deprecated",
            Status::Ote => "ote",
        };
        write!(f, "{s}")
    }
}

/// Which half of a table's drift an ALTER file carries. The executor
/// applies one kind per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlterKind {
    Columns,
    Indexes,
}

impl fmt::Display for AlterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlterKind::Columns => "columns",
            AlterKind::Indexes => "indexes",
        };
        write!(f, "{s}")
    }
}

/// A captured schema object. Immutable once produced by an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdlObject {
    pub environment: String,
    pub database: String,
    pub ddl_type: DdlType,
    pub name: String,
    pub raw_ddl: String,
    pub normalized_ddl: String,
    pub checksum: String,
}

impl DdlObject {
    /// Capture an object, normalizing and checksumming its DDL.
    pub fn capture(
        environment: impl Into<String>,
        database: impl Into<String>,
        ddl_type: DdlType,
        name: impl Into<String>,
        raw_ddl: impl Into<String>,
    ) -> Self {
        let raw_ddl = raw_ddl.into();
        let normalized_ddl = crate::normalize::normalize(&raw_ddl);
        let checksum = ddl_checksum(&normalized_ddl);
        Self {
            environment: environment.into(),
            database: database.into(),
            ddl_type,
            name: name.into(),
            raw_ddl,
            normalized_ddl,
            checksum,
        }
    }
}

/// Hex SHA-256 of normalized DDL text.
pub fn ddl_checksum(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Structural shape of a CREATE TABLE statement.
///
/// Clause definition text is kept verbatim so diffing can compare literally
/// after normalization; order is the order clauses appeared in the DDL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDefinition {
    pub table_name: String,
    /// Ordered column name -> full definition text.
    pub columns: Vec<(String, String)>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
    /// Ordered index name -> full definition text.
    pub indexes: Vec<(String, String)>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    pub fn index(&self, name: &str) -> Option<&str> {
        self.indexes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    /// True when parsing produced no usable structure.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.primary_key.is_empty() && self.indexes.is_empty()
    }
}

/// A stored routine split into header and body at the first standalone BEGIN.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDefinition {
    pub name: String,
    pub header: String,
    pub body: String,
}

/// Trigger activation timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
}

/// Row event a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

/// Structural shape of a CREATE TRIGGER statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDefinition {
    pub trigger_name: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub table_name: String,
    pub body: String,
}

/// One classified drift between a source and a destination environment.
///
/// Key = (src_env, dest_env, database, ddl_type, ddl_name); the store keeps
/// at most one live entry per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub src_env: String,
    pub dest_env: String,
    pub database: String,
    pub ddl_type: DdlType,
    pub ddl_name: String,
    pub status: Status,
    /// Incremental ALTER fragments; non-empty only for UPDATED tables.
    pub alter_statements: Vec<String>,
    pub diff_summary: String,
}

/// Audit row appended after each migration batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub src_env: String,
    pub dest_env: String,
    pub database: String,
    pub ddl_type: DdlType,
    pub ddl_name: String,
    pub operation: String,
    pub status: String,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Do-not-migrate policy for routines and triggers: case-insensitive "test"
/// substring or the reserved marker prefix. Matching names are skipped but
/// still counted as processed.
pub fn matches_skip_policy(name: &str) -> bool {
    name.to_lowercase().contains("test") || name.starts_with(NO_MIGRATE_PREFIX)
}

/// Partition shards are excluded from table creation.
pub fn is_partition_table(name: &str) -> bool {
    name.starts_with(PARTITION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_stable() {
        let a = ddl_checksum("CREATE TABLE t (id INT)");
        let b = ddl_checksum("CREATE TABLE t (id INT)");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, ddl_checksum("CREATE TABLE t (id BIGINT)"));
    }

    #[test]
    fn test_skip_policy() {
        assert!(matches_skip_policy("fn_Test_balance"));
        assert!(matches_skip_policy("zz_obsolete"));
        assert!(!matches_skip_policy("fn_balance"));
    }

    #[test]
    fn test_partition_prefix() {
        assert!(is_partition_table("pt_archive"));
        assert!(!is_partition_table("orders"));
    }

    #[test]
    fn test_table_definition_lookup() {
        let def = TableDefinition {
            table_name: "orders".into(),
            columns: vec![("id".into(), "`id` INT NOT NULL".into())],
            primary_key: vec!["id".into()],
            indexes: vec![],
        };
        assert_eq!(def.column("id"), Some("`id` INT NOT NULL"));
        assert_eq!(def.column("missing"), None);
        assert!(!def.is_empty());
    }

    #[test]
    fn test_capture_normalizes_and_checksums() {
        let obj = DdlObject::capture(
            "staging",
            "shop_staging",
            DdlType::Table,
            "orders",
            "create table orders (id int)",
        );
        assert_eq!(obj.raw_ddl, "create table orders (id int)");
        assert_eq!(obj.normalized_ddl, "CREATE TABLE orders (id INT)");
        assert_eq!(obj.checksum, ddl_checksum("CREATE TABLE orders (id INT)"));
    }

    #[test]
    fn test_ddl_type_keyword() {
        assert_eq!(DdlType::Procedure.sql_keyword(), "PROCEDURE");
        assert_eq!(DdlType::Table.to_string(), "table");
        assert!(DdlType::Function.is_routine());
        assert!(!DdlType::Trigger.is_routine());
    }
}
