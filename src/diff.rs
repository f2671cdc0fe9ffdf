//! Structural diffing and drift classification.
//!
//! Compares the exported DDL of a source and a destination environment and
//! classifies every named object as NEW, UPDATED or DEPRECATED. Updated
//! tables additionally get incremental ALTER fragments; routines and
//! triggers are replaced wholesale by the executor, so they carry none.

use std::collections::BTreeSet;

use crate::config::{DestOnlyPolicy, DriftConfig};
use crate::error::DriftResult;
use crate::logger::Logger;
use crate::model::{AlterKind, ClassificationEntry, DdlType, Status, TableDefinition};
use crate::normalize::normalize;
use crate::parse::parse_table_definition;
use crate::store::ClassificationStore;

/// Outcome of a column or index comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentDiff {
    /// ALTER fragments to apply at the destination, in source order.
    pub fragments: Vec<String>,
    /// Names present only at the destination, surfaced under the `flag`
    /// policy instead of being dropped.
    pub dest_only: Vec<String>,
}

impl FragmentDiff {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.dest_only.is_empty()
    }
}

/// Compare the column clauses of two tables.
///
/// Source-only columns yield ADD fragments; columns on both sides with
/// differing normalized definitions yield MODIFY fragments. Destination-only
/// columns are never silently dropped: under [`DestOnlyPolicy::Flag`] they
/// are surfaced, under [`DestOnlyPolicy::Drop`] they become DROP fragments.
pub fn compare_columns(
    src: &TableDefinition,
    dest: &TableDefinition,
    policy: DestOnlyPolicy,
) -> FragmentDiff {
    let mut diff = FragmentDiff::default();
    for (name, definition) in &src.columns {
        match dest.column(name) {
            None => diff.fragments.push(format!("ADD COLUMN {definition}")),
            Some(dest_def) => {
                if normalize(definition) != normalize(dest_def) {
                    diff.fragments.push(format!("MODIFY COLUMN {definition}"));
                }
            }
        }
    }
    for (name, _) in &dest.columns {
        if src.column(name).is_none() {
            match policy {
                DestOnlyPolicy::Flag => diff.dest_only.push(name.clone()),
                DestOnlyPolicy::Drop => diff.fragments.push(format!("DROP COLUMN `{name}`")),
            }
        }
    }
    diff
}

/// Compare the index clauses of two tables; same semantics as columns,
/// operating on index definition text.
pub fn compare_indexes(
    src: &TableDefinition,
    dest: &TableDefinition,
    policy: DestOnlyPolicy,
) -> FragmentDiff {
    let mut diff = FragmentDiff::default();
    for (name, definition) in &src.indexes {
        match dest.index(name) {
            None => diff.fragments.push(format!("ADD {definition}")),
            Some(dest_def) => {
                if normalize(definition) != normalize(dest_def) {
                    diff.fragments.push(format!("DROP INDEX `{name}`"));
                    diff.fragments.push(format!("ADD {definition}"));
                }
            }
        }
    }
    for (name, _) in &dest.indexes {
        if src.index(name).is_none() {
            match policy {
                DestOnlyPolicy::Flag => diff.dest_only.push(name.clone()),
                DestOnlyPolicy::Drop => diff.fragments.push(format!("DROP INDEX `{name}`")),
            }
        }
    }
    diff
}

/// Join fragments into one ALTER statement, comma-separated in input order.
pub fn generate_alter(table_name: &str, fragments: &[String]) -> String {
    format!("ALTER TABLE `{table_name}` {};", fragments.join(", "))
}

/// Classifies drift between a mapped source/destination environment pair.
pub struct DiffEngine<'a> {
    store: &'a dyn ClassificationStore,
    config: &'a DriftConfig,
    logger: &'a dyn Logger,
}

impl<'a> DiffEngine<'a> {
    pub fn new(
        store: &'a dyn ClassificationStore,
        config: &'a DriftConfig,
        logger: &'a dyn Logger,
    ) -> Self {
        Self {
            store,
            config,
            logger,
        }
    }

    /// Compare every exported object of one type between the destination's
    /// mapped source and the destination itself.
    ///
    /// Names are visited in lexical order, so output is deterministic across
    /// runs. Writes the pending lists, per-kind alter files and a JSON
    /// report, and returns the classification entries.
    pub fn compare(
        &self,
        ddl_type: DdlType,
        dest_env: &str,
    ) -> DriftResult<Vec<ClassificationEntry>> {
        let src_env = self.config.source_env(dest_env)?.to_string();
        let database = self.config.db_name(dest_env)?.to_string();

        let src_names = self.store.list_objects(&src_env, ddl_type)?;
        let dest_names = self.store.list_objects(dest_env, ddl_type)?;
        let all: BTreeSet<&String> = src_names.iter().chain(dest_names.iter()).collect();

        let mut entries = Vec::new();
        for name in all {
            let in_src = src_names.binary_search(name).is_ok();
            let in_dest = dest_names.binary_search(name).is_ok();
            let entry = match (in_src, in_dest) {
                (true, false) => self.classify(ddl_type, &src_env, dest_env, &database, name, Status::New, "only in source"),
                (false, true) => self.classify(ddl_type, &src_env, dest_env, &database, name, Status::Deprecated, "only in destination"),
                (true, true) => {
                    let src_ddl = self.store.read_ddl(&src_env, ddl_type, name)?;
                    let dest_ddl = self.store.read_ddl(dest_env, ddl_type, name)?;
                    if normalize(&src_ddl) == normalize(&dest_ddl) {
                        self.logger.debug(&format!("{ddl_type} {name}: unchanged"));
                        continue;
                    }
                    let mut entry = self.classify(
                        ddl_type,
                        &src_env,
                        dest_env,
                        &database,
                        name,
                        Status::Updated,
                        "definition differs",
                    );
                    if ddl_type == DdlType::Table {
                        self.diff_table(&mut entry, dest_env, name, &src_ddl, &dest_ddl)?;
                    }
                    entry
                }
                (false, false) => continue,
            };
            self.logger.info(&format!(
                "{ddl_type} {name}: {} ({})",
                entry.status, entry.diff_summary
            ));
            entries.push(entry);
        }

        for status in [Status::New, Status::Updated, Status::Deprecated] {
            let names: Vec<String> = entries
                .iter()
                .filter(|e| e.status == status)
                .map(|e| e.ddl_name.clone())
                .collect();
            self.store
                .write_pending(dest_env, ddl_type, status, &names)?;
        }
        self.store.write_report(dest_env, ddl_type, &entries)?;
        self.logger.info(&format!(
            "compared {ddl_type}s {src_env} -> {dest_env}: {} drifted",
            entries.len()
        ));
        Ok(entries)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        ddl_type: DdlType,
        src_env: &str,
        dest_env: &str,
        database: &str,
        name: &str,
        status: Status,
        summary: &str,
    ) -> ClassificationEntry {
        ClassificationEntry {
            src_env: src_env.to_string(),
            dest_env: dest_env.to_string(),
            database: database.to_string(),
            ddl_type,
            ddl_name: name.to_string(),
            status,
            alter_statements: Vec::new(),
            diff_summary: summary.to_string(),
        }
    }

    /// Compute incremental ALTER fragments for an updated table and write
    /// them to the per-kind alter files the executor consumes.
    ///
    /// Unparseable structure on either side means the texts differ but
    /// cannot be compared clause-by-clause: the entry stays UPDATED with no
    /// fragments and the failure is surfaced, never silently passed.
    fn diff_table(
        &self,
        entry: &mut ClassificationEntry,
        dest_env: &str,
        name: &str,
        src_ddl: &str,
        dest_ddl: &str,
    ) -> DriftResult<()> {
        let src_def = parse_table_definition(src_ddl);
        let dest_def = parse_table_definition(dest_ddl);
        if src_def.is_empty() || dest_def.is_empty() {
            self.logger.warn(&format!(
                "table {name}: structural parse failed, cannot compute ALTER"
            ));
            entry.diff_summary = "definition differs; structural parse failed".to_string();
            return Ok(());
        }

        let policy = self.config.dest_only_policy;
        let columns = compare_columns(&src_def, &dest_def, policy);
        let indexes = compare_indexes(&src_def, &dest_def, policy);

        if !columns.fragments.is_empty() {
            self.store.write_alter(
                dest_env,
                name,
                AlterKind::Columns,
                &generate_alter(name, &columns.fragments),
            )?;
        }
        if !indexes.fragments.is_empty() {
            self.store.write_alter(
                dest_env,
                name,
                AlterKind::Indexes,
                &generate_alter(name, &indexes.fragments),
            )?;
        }

        let mut summary = format!(
            "{} column change(s), {} index change(s)",
            columns.fragments.len(),
            indexes.fragments.len()
        );
        let flagged: Vec<&String> = columns.dest_only.iter().chain(&indexes.dest_only).collect();
        if !flagged.is_empty() {
            summary.push_str(&format!(
                "; destination-only (not dropped): {}",
                flagged
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        entry.diff_summary = summary;
        entry.alter_statements = columns
            .fragments
            .into_iter()
            .chain(indexes.fragments)
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;
    use crate::store::FileStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn table(name: &str, columns: &[(&str, &str)], indexes: &[(&str, &str)]) -> TableDefinition {
        TableDefinition {
            table_name: name.into(),
            columns: columns
                .iter()
                .map(|(n, d)| (n.to_string(), d.to_string()))
                .collect(),
            primary_key: vec![],
            indexes: indexes
                .iter()
                .map(|(n, d)| (n.to_string(), d.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_missing_column_yields_one_add() {
        let src = table(
            "t",
            &[("id", "`id` INT"), ("note", "`note` VARCHAR(20)")],
            &[],
        );
        let dest = table("t", &[("id", "`id` INT")], &[]);
        let diff = compare_columns(&src, &dest, DestOnlyPolicy::Flag);
        assert_eq!(diff.fragments, vec!["ADD COLUMN `note` VARCHAR(20)"]);
        assert!(diff.dest_only.is_empty());
    }

    #[test]
    fn test_changed_column_yields_modify() {
        let src = table("t", &[("id", "`id` BIGINT NOT NULL")], &[]);
        let dest = table("t", &[("id", "`id` int not null")], &[]);
        let diff = compare_columns(&src, &dest, DestOnlyPolicy::Flag);
        assert_eq!(diff.fragments, vec!["MODIFY COLUMN `id` BIGINT NOT NULL"]);
    }

    #[test]
    fn test_case_only_difference_is_no_change() {
        let src = table("t", &[("id", "`id` INT NOT NULL")], &[]);
        let dest = table("t", &[("id", "`id` int not null")], &[]);
        let diff = compare_columns(&src, &dest, DestOnlyPolicy::Flag);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_dest_only_column_flagged_not_dropped() {
        let src = table("t", &[("id", "`id` INT")], &[]);
        let dest = table("t", &[("id", "`id` INT"), ("old", "`old` TEXT")], &[]);
        let diff = compare_columns(&src, &dest, DestOnlyPolicy::Flag);
        assert!(diff.fragments.is_empty());
        assert_eq!(diff.dest_only, vec!["old"]);

        let dropped = compare_columns(&src, &dest, DestOnlyPolicy::Drop);
        assert_eq!(dropped.fragments, vec!["DROP COLUMN `old`"]);
    }

    #[test]
    fn test_identical_indexes_empty() {
        let src = table("t", &[], &[("idx_a", "KEY `idx_a` (`a`)")]);
        let dest = table("t", &[], &[("idx_a", "KEY `idx_a` (`a`)")]);
        assert!(compare_indexes(&src, &dest, DestOnlyPolicy::Flag).is_empty());
    }

    #[test]
    fn test_src_only_index_yields_one_add() {
        let src = table("t", &[], &[("idx_a", "KEY `idx_a` (`a`)")]);
        let dest = table("t", &[], &[]);
        let diff = compare_indexes(&src, &dest, DestOnlyPolicy::Flag);
        assert_eq!(diff.fragments, vec!["ADD KEY `idx_a` (`a`)"]);
    }

    #[test]
    fn test_generate_alter() {
        let sql = generate_alter("t", &["ADD x".to_string(), "DROP y".to_string()]);
        assert_eq!(sql, "ALTER TABLE `t` ADD x, DROP y;");
    }

    fn fixture() -> (TempDir, FileStore, DriftConfig) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let config = DriftConfig::from_toml(&format!(
            r#"
store_root = "{}"

[environments.staging]
host = "s"
user = "u"
password = "p"
database = "shop_staging"

[environments.production]
host = "p"
user = "u"
password = "p"
database = "shop_prod"

[mapping]
production = "staging"
"#,
            dir.path().display()
        ))
        .unwrap();
        (dir, store, config)
    }

    #[test]
    fn test_compare_classifies_new_updated_deprecated() {
        let (_dir, store, config) = fixture();
        use crate::store::ClassificationStore as _;
        store
            .write_ddl("staging", DdlType::Table, "added", "CREATE TABLE added (`id` INT)")
            .unwrap();
        store
            .write_ddl(
                "staging",
                DdlType::Table,
                "orders",
                "CREATE TABLE orders (`id` INT, `note` TEXT, KEY `idx_note` (`note`(8)))",
            )
            .unwrap();
        store
            .write_ddl("staging", DdlType::Table, "same", "CREATE TABLE same (`id` INT)")
            .unwrap();
        store
            .write_ddl("production", DdlType::Table, "orders", "CREATE TABLE orders (`id` INT)")
            .unwrap();
        store
            .write_ddl("production", DdlType::Table, "same", "create table same (`id` int)")
            .unwrap();
        store
            .write_ddl("production", DdlType::Table, "gone", "CREATE TABLE gone (`id` INT)")
            .unwrap();

        let logger = MemoryLogger::new();
        let engine = DiffEngine::new(&store, &config, &logger);
        let entries = engine.compare(DdlType::Table, "production").unwrap();

        // Lexical order: added, gone, orders ("same" is unchanged).
        let summary: Vec<(&str, Status)> = entries
            .iter()
            .map(|e| (e.ddl_name.as_str(), e.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("added", Status::New),
                ("gone", Status::Deprecated),
                ("orders", Status::Updated),
            ]
        );

        // Updated table carries merged column + index fragments.
        let orders = &entries[2];
        assert_eq!(
            orders.alter_statements,
            vec![
                "ADD COLUMN `note` TEXT",
                "ADD KEY `idx_note` (`note`(8))"
            ]
        );
        // Other statuses never carry fragments.
        assert!(entries[0].alter_statements.is_empty());
        assert!(entries[1].alter_statements.is_empty());

        // Pending lists were written per status.
        assert_eq!(
            store
                .read_pending("production", DdlType::Table, Status::New)
                .unwrap(),
            vec!["added"]
        );
        assert_eq!(
            store
                .read_pending("production", DdlType::Table, Status::Updated)
                .unwrap(),
            vec!["orders"]
        );
        assert_eq!(
            store
                .read_pending("production", DdlType::Table, Status::Deprecated)
                .unwrap(),
            vec!["gone"]
        );

        // Per-kind alter files exist for the updated table.
        assert_eq!(
            store
                .read_alter("production", "orders", AlterKind::Columns)
                .unwrap()
                .unwrap(),
            "ALTER TABLE `orders` ADD COLUMN `note` TEXT;"
        );
        assert_eq!(
            store
                .read_alter("production", "orders", AlterKind::Indexes)
                .unwrap()
                .unwrap(),
            "ALTER TABLE `orders` ADD KEY `idx_note` (`note`(8));"
        );
        assert!(logger.contains("same: unchanged"));
    }

    #[test]
    fn test_compare_routines_carry_no_fragments() {
        let (_dir, store, config) = fixture();
        use crate::store::ClassificationStore as _;
        store
            .write_ddl(
                "staging",
                DdlType::Function,
                "fn_total",
                "CREATE FUNCTION fn_total() RETURNS INT BEGIN RETURN 2; END",
            )
            .unwrap();
        store
            .write_ddl(
                "production",
                DdlType::Function,
                "fn_total",
                "CREATE FUNCTION fn_total() RETURNS INT BEGIN RETURN 1; END",
            )
            .unwrap();

        let logger = MemoryLogger::new();
        let engine = DiffEngine::new(&store, &config, &logger);
        let entries = engine.compare(DdlType::Function, "production").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Status::Updated);
        assert!(entries[0].alter_statements.is_empty());
    }

    #[test]
    fn test_unparseable_updated_table_warns() {
        let (_dir, store, config) = fixture();
        use crate::store::ClassificationStore as _;
        store
            .write_ddl("staging", DdlType::Table, "odd", "CREATE TABLE odd (`id` INT)")
            .unwrap();
        // Destination export is garbage: differs but cannot be parsed.
        store
            .write_ddl("production", DdlType::Table, "odd", "???")
            .unwrap();

        let logger = MemoryLogger::new();
        let engine = DiffEngine::new(&store, &config, &logger);
        let entries = engine.compare(DdlType::Table, "production").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Status::Updated);
        assert!(entries[0].alter_statements.is_empty());
        assert!(entries[0].diff_summary.contains("parse failed"));
        assert!(logger.contains("structural parse failed"));
    }
}
