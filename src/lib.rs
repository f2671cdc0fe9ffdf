//! # schemadrift — MySQL schema drift detection and migration
//!
//! Detects drift between a source environment's schema and a destination's,
//! classifies every tracked object as new, updated, or deprecated, and
//! applies the resulting pending lists as all-or-nothing transactional
//! batches.
//!
//! ## Quick example
//!
//! ```rust,ignore
//! use schemadrift::prelude::*;
//!
//! let config = DriftConfig::load(&path)?;
//! let store = FileStore::new(&config.store_root);
//! let logger = TracingLogger;
//!
//! // Classify drift for every tracked object type.
//! let engine = DiffEngine::new(&store, &config, &logger);
//! for ddl_type in DdlType::ALL {
//!     engine.compare(ddl_type, "production")?;
//! }
//!
//! // Drain one pending list against the destination database.
//! let executor = MigrationExecutor::new(&store, &config, &logger, false);
//! let applied = executor
//!     .migrate(DdlType::Function, Status::New, "production")
//!     .await?;
//! ```
//!
//! ## Pipeline
//!
//! | Stage      | Module      | Responsibility                          |
//! |------------|-------------|-----------------------------------------|
//! | Normalize  | `normalize` | Canonical DDL text for comparison       |
//! | Parse      | `parse`     | Structural shape of tables and triggers |
//! | Diff       | `diff`      | Classification and ALTER generation     |
//! | Store      | `store`     | Pending lists, mirrors, backups, audit  |
//! | Migrate    | `migrate`   | Transactional batch execution           |

pub mod config;
pub mod diff;
pub mod error;
pub mod logger;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod store;
pub mod surface;

pub mod prelude {
    pub use crate::config::{DbEnv, DestOnlyPolicy, DriftConfig};
    pub use crate::diff::DiffEngine;
    pub use crate::error::{DriftError, DriftResult};
    pub use crate::logger::{Logger, MemoryLogger, TracingLogger};
    pub use crate::migrate::MigrationExecutor;
    pub use crate::model::{
        AlterKind, ClassificationEntry, DdlObject, DdlType, MigrationRecord, Status,
    };
    pub use crate::normalize::normalize;
    pub use crate::store::{ClassificationStore, FileStore};
    pub use crate::surface::{MySqlSurface, SqlSurface};
}

/// Normalize one DDL statement to its canonical comparison form.
///
/// # Example
///
/// ```
/// use schemadrift::normalize;
///
/// let out = normalize("create   table t (id int)");
/// assert_eq!(out, "CREATE TABLE t (id INT)");
/// ```
pub fn normalize(ddl: &str) -> String {
    normalize::normalize(ddl)
}
