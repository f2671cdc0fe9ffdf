//! Classification store: pending lists, DDL mirrors, alter fragments,
//! backups, and the audit trail.
//!
//! [`ClassificationStore`] is the persistence seam the diff engine writes
//! through and the migration executor drains. [`FileStore`] is the shipped
//! file-backed implementation; a relational-table-backed store can plug in
//! behind the same trait.
//!
//! File layout under the store root:
//!
//! ```text
//! <root>/<env>/<type>s/<name>.sql            exported DDL / mirrors
//! <root>/pending/<env>/<type>.<status>.list  ordered pending names
//! <root>/alters/<env>/<table>.<kind>.sql     precomputed ALTER statements
//! <root>/backup/<env>/<YYYYMMDD>/<type>s/    dated pre-migration copies
//! <root>/reports/<env>.<type>.json           classification reports
//! <root>/audit/migrations.jsonl              one MigrationRecord per line
//! ```

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{DriftError, DriftResult};
use crate::model::{AlterKind, ClassificationEntry, DdlType, MigrationRecord, Status};

/// Persistence seam between the diff engine and the migration executor.
pub trait ClassificationStore: Send + Sync {
    /// Object names exported for an environment, in lexical order.
    fn list_objects(&self, env: &str, ddl_type: DdlType) -> DriftResult<Vec<String>>;
    fn read_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> DriftResult<String>;
    /// Write or overwrite an environment's tracked copy of an object.
    fn write_ddl(&self, env: &str, ddl_type: DdlType, name: &str, ddl: &str) -> DriftResult<()>;
    fn remove_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> DriftResult<()>;
    fn has_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> bool;
    /// Copy an environment's current DDL for an object into the dated
    /// backup area. Missing source is a no-op: a brand-new object has no
    /// prior state to preserve.
    fn copy_to_backup(
        &self,
        env: &str,
        ddl_type: DdlType,
        name: &str,
        date: &str,
    ) -> DriftResult<()>;

    /// Ordered pending names for one (env, type, status) list; empty when
    /// no list exists.
    fn read_pending(&self, env: &str, ddl_type: DdlType, status: Status)
    -> DriftResult<Vec<String>>;
    fn write_pending(
        &self,
        env: &str,
        ddl_type: DdlType,
        status: Status,
        names: &[String],
    ) -> DriftResult<()>;
    fn clear_pending(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()>;
    /// Atomically claim one pending list: the list is moved aside in a
    /// single step, so a concurrent run observes it as empty. Returns the
    /// claimed names; empty when no list exists.
    fn claim_pending(&self, env: &str, ddl_type: DdlType, status: Status)
    -> DriftResult<Vec<String>>;
    /// Put a claimed list back after a failed batch so a retry picks it up.
    fn release_pending(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()>;
    /// Drop a claimed list after the batch committed.
    fn discard_claim(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()>;

    fn read_alter(&self, env: &str, table: &str, kind: AlterKind) -> DriftResult<Option<String>>;
    fn write_alter(&self, env: &str, table: &str, kind: AlterKind, sql: &str) -> DriftResult<()>;
    fn remove_alter(&self, env: &str, table: &str, kind: AlterKind) -> DriftResult<()>;

    fn write_report(
        &self,
        env: &str,
        ddl_type: DdlType,
        entries: &[ClassificationEntry],
    ) -> DriftResult<()>;
    fn append_record(&self, record: &MigrationRecord) -> DriftResult<()>;
}

/// File-backed store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ddl_path(&self, env: &str, ddl_type: DdlType, name: &str) -> PathBuf {
        self.root
            .join(env)
            .join(format!("{ddl_type}s"))
            .join(format!("{name}.sql"))
    }

    fn pending_path(&self, env: &str, ddl_type: DdlType, status: Status) -> PathBuf {
        self.root
            .join("pending")
            .join(env)
            .join(format!("{ddl_type}.{status}.list"))
    }

    fn claimed_path(&self, env: &str, ddl_type: DdlType, status: Status) -> PathBuf {
        self.root
            .join("pending")
            .join(env)
            .join(format!("{ddl_type}.{status}.claimed"))
    }

    fn alter_path(&self, env: &str, table: &str, kind: AlterKind) -> PathBuf {
        self.root
            .join("alters")
            .join(env)
            .join(format!("{table}.{kind}.sql"))
    }

    fn write_file(&self, path: &Path, content: &str) -> DriftResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn remove_file(path: &Path) -> DriftResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ClassificationStore for FileStore {
    fn list_objects(&self, env: &str, ddl_type: DdlType) -> DriftResult<Vec<String>> {
        let dir = self.root.join(env).join(format!("{ddl_type}s"));
        let mut names = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "sql")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> DriftResult<String> {
        let path = self.ddl_path(env, ddl_type, name);
        fs::read_to_string(&path)
            .map_err(|e| DriftError::Store(format!("{}: {e}", path.display())))
    }

    fn write_ddl(&self, env: &str, ddl_type: DdlType, name: &str, ddl: &str) -> DriftResult<()> {
        self.write_file(&self.ddl_path(env, ddl_type, name), ddl)
    }

    fn remove_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> DriftResult<()> {
        Self::remove_file(&self.ddl_path(env, ddl_type, name))
    }

    fn has_ddl(&self, env: &str, ddl_type: DdlType, name: &str) -> bool {
        self.ddl_path(env, ddl_type, name).is_file()
    }

    fn copy_to_backup(
        &self,
        env: &str,
        ddl_type: DdlType,
        name: &str,
        date: &str,
    ) -> DriftResult<()> {
        let src = self.ddl_path(env, ddl_type, name);
        if !src.is_file() {
            return Ok(());
        }
        let dest = self
            .root
            .join("backup")
            .join(env)
            .join(date)
            .join(format!("{ddl_type}s"))
            .join(format!("{name}.sql"));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, &dest)?;
        Ok(())
    }

    fn read_pending(
        &self,
        env: &str,
        ddl_type: DdlType,
        status: Status,
    ) -> DriftResult<Vec<String>> {
        let path = self.pending_path(env, ddl_type, status);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn write_pending(
        &self,
        env: &str,
        ddl_type: DdlType,
        status: Status,
        names: &[String],
    ) -> DriftResult<()> {
        let path = self.pending_path(env, ddl_type, status);
        if names.is_empty() {
            return Self::remove_file(&path);
        }
        let mut content = names.join("\n");
        content.push('\n');
        self.write_file(&path, &content)
    }

    fn clear_pending(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()> {
        Self::remove_file(&self.pending_path(env, ddl_type, status))
    }

    fn claim_pending(
        &self,
        env: &str,
        ddl_type: DdlType,
        status: Status,
    ) -> DriftResult<Vec<String>> {
        let list = self.pending_path(env, ddl_type, status);
        let claimed = self.claimed_path(env, ddl_type, status);
        // Rename is the atomic step: after it, a concurrent claim sees no
        // list. A leftover claim from a crashed run is overwritten.
        match fs::rename(&list, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        let text = fs::read_to_string(&claimed)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn release_pending(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()> {
        let claimed = self.claimed_path(env, ddl_type, status);
        match fs::rename(&claimed, self.pending_path(env, ddl_type, status)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_claim(&self, env: &str, ddl_type: DdlType, status: Status) -> DriftResult<()> {
        Self::remove_file(&self.claimed_path(env, ddl_type, status))
    }

    fn read_alter(&self, env: &str, table: &str, kind: AlterKind) -> DriftResult<Option<String>> {
        let path = self.alter_path(env, table, kind);
        match fs::read_to_string(&path) {
            Ok(sql) => Ok(Some(sql)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_alter(&self, env: &str, table: &str, kind: AlterKind, sql: &str) -> DriftResult<()> {
        self.write_file(&self.alter_path(env, table, kind), sql)
    }

    fn remove_alter(&self, env: &str, table: &str, kind: AlterKind) -> DriftResult<()> {
        Self::remove_file(&self.alter_path(env, table, kind))
    }

    fn write_report(
        &self,
        env: &str,
        ddl_type: DdlType,
        entries: &[ClassificationEntry],
    ) -> DriftResult<()> {
        let path = self
            .root
            .join("reports")
            .join(format!("{env}.{ddl_type}.json"));
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| DriftError::Store(e.to_string()))?;
        self.write_file(&path, &json)
    }

    fn append_record(&self, record: &MigrationRecord) -> DriftResult<()> {
        let path = self.root.join("audit").join("migrations.jsonl");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(record).map_err(|e| DriftError::Store(e.to_string()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_ddl_roundtrip_and_listing() {
        let (_dir, store) = store();
        store
            .write_ddl("staging", DdlType::Table, "orders", "CREATE TABLE orders (id INT)")
            .unwrap();
        store
            .write_ddl("staging", DdlType::Table, "accounts", "CREATE TABLE accounts (id INT)")
            .unwrap();

        // Lexical order, regardless of write order.
        assert_eq!(
            store.list_objects("staging", DdlType::Table).unwrap(),
            vec!["accounts", "orders"]
        );
        assert!(store.has_ddl("staging", DdlType::Table, "orders"));
        assert!(!store.has_ddl("staging", DdlType::Function, "orders"));
        assert_eq!(
            store.read_ddl("staging", DdlType::Table, "orders").unwrap(),
            "CREATE TABLE orders (id INT)"
        );

        store.remove_ddl("staging", DdlType::Table, "orders").unwrap();
        assert!(!store.has_ddl("staging", DdlType::Table, "orders"));
        // Removing twice is fine.
        store.remove_ddl("staging", DdlType::Table, "orders").unwrap();
    }

    #[test]
    fn test_missing_env_lists_empty() {
        let (_dir, store) = store();
        assert!(store.list_objects("qa", DdlType::Trigger).unwrap().is_empty());
    }

    #[test]
    fn test_pending_list_roundtrip() {
        let (_dir, store) = store();
        let names = vec!["fn_a".to_string(), "fn_b".to_string()];
        store
            .write_pending("production", DdlType::Function, Status::New, &names)
            .unwrap();
        assert_eq!(
            store
                .read_pending("production", DdlType::Function, Status::New)
                .unwrap(),
            names
        );

        store
            .clear_pending("production", DdlType::Function, Status::New)
            .unwrap();
        assert!(
            store
                .read_pending("production", DdlType::Function, Status::New)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_claim_release_discard_lifecycle() {
        let (_dir, store) = store();
        let names = vec!["fn_a".to_string(), "fn_b".to_string()];
        store
            .write_pending("production", DdlType::Function, Status::New, &names)
            .unwrap();

        // Claiming consumes the list in one step.
        let claimed = store
            .claim_pending("production", DdlType::Function, Status::New)
            .unwrap();
        assert_eq!(claimed, names);
        assert!(
            store
                .read_pending("production", DdlType::Function, Status::New)
                .unwrap()
                .is_empty()
        );
        // A second claimer gets nothing.
        assert!(
            store
                .claim_pending("production", DdlType::Function, Status::New)
                .unwrap()
                .is_empty()
        );

        // Release puts the list back for retry.
        store
            .release_pending("production", DdlType::Function, Status::New)
            .unwrap();
        assert_eq!(
            store
                .read_pending("production", DdlType::Function, Status::New)
                .unwrap(),
            names
        );

        // Claim again, then discard after a commit.
        store
            .claim_pending("production", DdlType::Function, Status::New)
            .unwrap();
        store
            .discard_claim("production", DdlType::Function, Status::New)
            .unwrap();
        store
            .release_pending("production", DdlType::Function, Status::New)
            .unwrap();
        assert!(
            store
                .read_pending("production", DdlType::Function, Status::New)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_alter_files_per_kind() {
        let (_dir, store) = store();
        store
            .write_alter("production", "orders", AlterKind::Columns, "ALTER TABLE `orders` ADD COLUMN x INT;")
            .unwrap();
        assert!(
            store
                .read_alter("production", "orders", AlterKind::Columns)
                .unwrap()
                .is_some()
        );
        assert_eq!(
            store
                .read_alter("production", "orders", AlterKind::Indexes)
                .unwrap(),
            None
        );
        store
            .remove_alter("production", "orders", AlterKind::Columns)
            .unwrap();
        assert_eq!(
            store
                .read_alter("production", "orders", AlterKind::Columns)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_backup_copies_current_mirror() {
        let (_dir, store) = store();
        store
            .write_ddl("production", DdlType::Function, "fn_a", "CREATE FUNCTION fn_a ...")
            .unwrap();
        store
            .copy_to_backup("production", DdlType::Function, "fn_a", "20260825")
            .unwrap();
        let backup = store
            .root()
            .join("backup/production/20260825/functions/fn_a.sql");
        assert_eq!(
            std::fs::read_to_string(backup).unwrap(),
            "CREATE FUNCTION fn_a ..."
        );
        // No prior mirror: nothing to back up, not an error.
        store
            .copy_to_backup("production", DdlType::Function, "fn_new", "20260825")
            .unwrap();
    }

    #[test]
    fn test_audit_appends_jsonl() {
        let (_dir, store) = store();
        let record = MigrationRecord {
            src_env: "staging".into(),
            dest_env: "production".into(),
            database: "shop_prod".into(),
            ddl_type: DdlType::Function,
            ddl_name: "fn_a".into(),
            operation: "create".into(),
            status: "applied".into(),
            error_message: None,
            executed_at: Utc::now(),
        };
        store.append_record(&record).unwrap();
        store.append_record(&record).unwrap();
        let text =
            std::fs::read_to_string(store.root().join("audit/migrations.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"fn_a\""));
    }
}
