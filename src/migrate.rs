//! Transactional migration execution.
//!
//! Drains one pending classification list against one destination connection
//! per invocation. Every batch is all-or-nothing: one transaction spans the
//! whole list, any failure rolls the batch back, logs, and reports zero
//! processed, leaving the pending list untouched for retry. Dry-run mode
//! logs every destructive statement instead of executing it and opens no
//! transaction.
//!
//! Objects are processed strictly in list order; DDL on the same schema can
//! have ordering dependencies. One external invoker per environment at a
//! time is assumed; concurrent invocations are out of contract.

use chrono::Utc;
use std::time::Instant;

use crate::config::DriftConfig;
use crate::error::DriftResult;
use crate::logger::Logger;
use crate::model::{
    AlterKind, DdlType, MigrationRecord, Status, is_partition_table, matches_skip_policy,
};
use crate::normalize::normalize;
use crate::store::ClassificationStore;
use crate::surface::{MySqlSurface, SqlSurface, insert_statement};

/// Applies pending classification lists to destination databases.
pub struct MigrationExecutor<'a> {
    store: &'a dyn ClassificationStore,
    config: &'a DriftConfig,
    logger: &'a dyn Logger,
    dry_run: bool,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(
        store: &'a dyn ClassificationStore,
        config: &'a DriftConfig,
        logger: &'a dyn Logger,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            config,
            logger,
            dry_run,
        }
    }

    /// Open one destination connection, dispatch by (type, status), release
    /// the connection on every exit path, and log elapsed wall-clock time.
    pub async fn migrate(
        &self,
        ddl_type: DdlType,
        from_status: Status,
        env: &str,
    ) -> DriftResult<usize> {
        let started = Instant::now();
        let db_env = self.config.db_destination(env)?;
        let mut surface = MySqlSurface::connect(db_env).await?;
        let result = self.run(&mut surface, env, ddl_type, from_status).await;
        if let Err(e) = surface.close().await {
            self.logger.warn(&format!("closing connection to {env}: {e}"));
        }
        self.logger.info(&format!(
            "migrate {ddl_type}/{from_status} against {env} took {:?}",
            started.elapsed()
        ));
        self.audit(ddl_type, from_status, env, &result);
        result
    }

    /// Copy seed rows from the mapped source into a destination environment,
    /// one connection per side.
    pub async fn seed(&self, env: &str) -> DriftResult<usize> {
        let src_env = self.config.source_env(env)?.to_string();
        let mut src = MySqlSurface::connect(self.config.db_destination(&src_env)?).await?;
        let mut dest = MySqlSurface::connect(self.config.db_destination(env)?).await?;
        let result = self.seed_data(&mut src, &mut dest).await;
        if let Err(e) = src.close().await {
            self.logger.warn(&format!("closing connection to {src_env}: {e}"));
        }
        if let Err(e) = dest.close().await {
            self.logger.warn(&format!("closing connection to {env}: {e}"));
        }
        result
    }

    /// Fixed (type, status) routing table. Exhaustive by construction.
    pub async fn run<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        ddl_type: DdlType,
        from_status: Status,
    ) -> DriftResult<usize> {
        match (ddl_type, from_status) {
            (DdlType::Table, Status::New) => self.migrate_tables(surface, env).await,
            (DdlType::Table, Status::Updated) => self.apply_table_alters(surface, env).await,
            (DdlType::Table, Status::Deprecated | Status::Ote) => {
                self.logger.warn(
                    "table drops are not automated; review the deprecated list manually",
                );
                Ok(0)
            }
            (
                kind @ (DdlType::Function | DdlType::Procedure | DdlType::Trigger),
                status @ (Status::New | Status::Updated),
            ) => self.migrate_routines(surface, env, kind, status).await,
            (
                kind @ (DdlType::Function | DdlType::Procedure | DdlType::Trigger),
                status @ (Status::Deprecated | Status::Ote),
            ) => self.deprecate_routines(surface, env, kind, status).await,
        }
    }

    /// Drop-and-recreate every routine or trigger on one pending list.
    ///
    /// The drop runs even for names matching the skip policy; only the
    /// recreate is withheld. Skipped names still count as processed.
    pub async fn migrate_routines<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        ddl_type: DdlType,
        from_status: Status,
    ) -> DriftResult<usize> {
        if self.dry_run {
            let names = self.store.read_pending(env, ddl_type, from_status)?;
            if names.is_empty() {
                self.logger
                    .debug(&format!("no pending {ddl_type}s with status {from_status}"));
                return Ok(0);
            }
            let src_env = self.config.source_env(env)?.to_string();
            for name in &names {
                self.logger.info(&format!(
                    "dry-run: DROP {} IF EXISTS `{name}`",
                    ddl_type.sql_keyword()
                ));
                if matches_skip_policy(name) {
                    self.logger.info(&format!("dry-run: skip recreate of `{name}`"));
                    continue;
                }
                let create = self.create_statement(&src_env, env, ddl_type, name)?;
                self.logger.info(&format!("dry-run: {create}"));
            }
            return Ok(names.len());
        }

        let names = self.store.claim_pending(env, ddl_type, from_status)?;
        if names.is_empty() {
            self.logger
                .debug(&format!("no pending {ddl_type}s with status {from_status}"));
            return Ok(0);
        }
        let src_env = self.config.source_env(env)?.to_string();

        if let Err(e) = surface.begin().await {
            self.logger.error(&format!("cannot open transaction: {e}"));
            self.store.release_pending(env, ddl_type, from_status)?;
            return Ok(0);
        }
        let batch = self
            .routine_batch(surface, env, &src_env, ddl_type, &names)
            .await;
        let (processed, recreated) = match batch {
            Ok(v) => v,
            Err(e) => {
                let msg = format!("batch failed, rolling back: {e}");
                return self.fail_batch(surface, env, ddl_type, from_status, &msg).await;
            }
        };
        if let Err(e) = surface.commit().await {
            let msg = format!("commit failed: {e}");
            return self.fail_batch(surface, env, ddl_type, from_status, &msg).await;
        }
        // Mirrors and backups are touched only once the batch is durable;
        // a rolled-back batch must leave the store exactly as it found it.
        let date = Utc::now().format("%Y%m%d").to_string();
        for name in &recreated {
            self.store.copy_to_backup(env, ddl_type, name, &date)?;
            let src_ddl = self.store.read_ddl(&src_env, ddl_type, name)?;
            self.store.write_ddl(env, ddl_type, name, &src_ddl)?;
        }
        self.store.discard_claim(env, ddl_type, from_status)?;
        Ok(processed)
    }

    /// Executes the DDL only. Returns the processed count and the names
    /// actually recreated, so the caller can refresh mirrors after commit.
    async fn routine_batch<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        src_env: &str,
        ddl_type: DdlType,
        names: &[String],
    ) -> DriftResult<(usize, Vec<String>)> {
        let mut processed = 0;
        let mut recreated = Vec::new();
        for name in names {
            surface
                .execute(&format!(
                    "DROP {} IF EXISTS `{name}`",
                    ddl_type.sql_keyword()
                ))
                .await?;
            if matches_skip_policy(name) {
                self.logger
                    .info(&format!("{ddl_type} `{name}` matches skip policy, not recreated"));
                processed += 1;
                continue;
            }
            let create = self.create_statement(src_env, env, ddl_type, name)?;
            surface.execute(&create).await?;
            recreated.push(name.clone());
            processed += 1;
        }
        Ok((processed, recreated))
    }

    fn create_statement(
        &self,
        src_env: &str,
        env: &str,
        ddl_type: DdlType,
        name: &str,
    ) -> DriftResult<String> {
        let raw = self.store.read_ddl(src_env, ddl_type, name)?;
        self.config.replace_with_env(&normalize(&raw), env)
    }

    /// Drop every routine or trigger on a teardown list and remove its
    /// mirror. `from_status` defaults to Deprecated at call sites; OTE is
    /// the overridable teardown list for non-production environments.
    pub async fn deprecate_routines<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        ddl_type: DdlType,
        from_status: Status,
    ) -> DriftResult<usize> {
        if self.dry_run {
            let names = self.store.read_pending(env, ddl_type, from_status)?;
            if names.is_empty() {
                self.logger
                    .debug(&format!("no pending {ddl_type}s with status {from_status}"));
                return Ok(0);
            }
            for name in &names {
                self.logger.info(&format!(
                    "dry-run: DROP {} IF EXISTS `{name}`",
                    ddl_type.sql_keyword()
                ));
            }
            return Ok(names.len());
        }

        let names = self.store.claim_pending(env, ddl_type, from_status)?;
        if names.is_empty() {
            self.logger
                .debug(&format!("no pending {ddl_type}s with status {from_status}"));
            return Ok(0);
        }

        if let Err(e) = surface.begin().await {
            self.logger.error(&format!("cannot open transaction: {e}"));
            self.store.release_pending(env, ddl_type, from_status)?;
            return Ok(0);
        }
        let batch: DriftResult<()> = async {
            for name in &names {
                surface
                    .execute(&format!(
                        "DROP {} IF EXISTS `{name}`",
                        ddl_type.sql_keyword()
                    ))
                    .await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = batch {
            let msg = format!("batch failed, rolling back: {e}");
            return self.fail_batch(surface, env, ddl_type, from_status, &msg).await;
        }
        if let Err(e) = surface.commit().await {
            let msg = format!("commit failed: {e}");
            return self.fail_batch(surface, env, ddl_type, from_status, &msg).await;
        }
        // Mirrors go away only after the drops are durable.
        for name in &names {
            self.store.remove_ddl(env, ddl_type, name)?;
        }
        self.store.discard_claim(env, ddl_type, from_status)?;
        Ok(names.len())
    }

    /// Create NEW tables at the destination from the source DDL, verbatim.
    ///
    /// Partition shards and tables that already exist are skipped; the
    /// returned count covers tables actually created.
    pub async fn migrate_tables<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
    ) -> DriftResult<usize> {
        let names = if self.dry_run {
            self.store.read_pending(env, DdlType::Table, Status::New)?
        } else {
            self.store.claim_pending(env, DdlType::Table, Status::New)?
        };
        if names.is_empty() {
            self.logger.debug("no pending tables with status new");
            return Ok(0);
        }
        let src_env = self.config.source_env(env)?.to_string();

        if !self.dry_run && let Err(e) = surface.begin().await {
            self.logger.error(&format!("cannot open transaction: {e}"));
            self.store
                .release_pending(env, DdlType::Table, Status::New)?;
            return Ok(0);
        }
        let batch: DriftResult<Vec<(String, String)>> = async {
            let mut created = Vec::new();
            for name in &names {
                if is_partition_table(name) {
                    self.logger
                        .info(&format!("table `{name}` has the partition prefix, skipped"));
                    continue;
                }
                if self.is_table_exists(surface, name).await {
                    self.logger
                        .info(&format!("table `{name}` already exists, skipped"));
                    continue;
                }
                let ddl = self.store.read_ddl(&src_env, DdlType::Table, name)?;
                if self.dry_run {
                    self.logger.info(&format!("dry-run: {ddl}"));
                } else {
                    surface.execute(&ddl).await?;
                }
                created.push((name.clone(), ddl));
            }
            Ok(created)
        }
        .await;
        if self.dry_run {
            return batch.map(|created| created.len());
        }
        let created = match batch {
            Ok(v) => v,
            Err(e) => {
                let msg = format!("batch failed, rolling back: {e}");
                return self
                    .fail_batch(surface, env, DdlType::Table, Status::New, &msg)
                    .await;
            }
        };
        if let Err(e) = surface.commit().await {
            let msg = format!("commit failed: {e}");
            return self
                .fail_batch(surface, env, DdlType::Table, Status::New, &msg)
                .await;
        }
        // Destination mirrors are written only once the creates are durable.
        for (name, ddl) in &created {
            self.store.write_ddl(env, DdlType::Table, name, ddl)?;
        }
        self.store
            .discard_claim(env, DdlType::Table, Status::New)?;
        Ok(created.len())
    }

    /// Apply the precomputed ALTER for one kind to every UPDATED table.
    ///
    /// Tables absent from the destination are skipped; each applied alter
    /// file is deleted. One kind per call. The pending list itself is
    /// cleared by the (Table, Updated) route once both kinds have run.
    pub async fn alter_table_columns<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        kind: AlterKind,
    ) -> DriftResult<usize> {
        let names = self
            .store
            .read_pending(env, DdlType::Table, Status::Updated)?;
        if names.is_empty() {
            self.logger.debug("no pending tables with status updated");
            return Ok(0);
        }
        let applied = self.alter_batch(surface, env, kind, &names).await?;
        Ok(applied.map(|names| names.len()).unwrap_or(0))
    }

    /// Returns `Some(applied table names)` on commit, `None` after rollback.
    async fn alter_batch<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        kind: AlterKind,
        names: &[String],
    ) -> DriftResult<Option<Vec<String>>> {
        if self.dry_run {
            let mut applied = Vec::new();
            for name in names {
                if let Some(sql) = self.store.read_alter(env, name, kind)? {
                    self.logger.info(&format!("dry-run: {sql}"));
                    applied.push(name.clone());
                }
            }
            return Ok(Some(applied));
        }

        if let Err(e) = surface.begin().await {
            self.logger.error(&format!("cannot open transaction: {e}"));
            return Ok(None);
        }
        let batch: DriftResult<Vec<String>> = async {
            let mut applied = Vec::new();
            for name in names {
                if !self.is_table_exists(surface, name).await {
                    self.logger
                        .info(&format!("table `{name}` absent from destination, skipped"));
                    continue;
                }
                let Some(sql) = self.store.read_alter(env, name, kind)? else {
                    self.logger
                        .debug(&format!("table `{name}`: no {kind} alter to apply"));
                    continue;
                };
                surface.execute(&sql).await?;
                applied.push(name.clone());
            }
            Ok(applied)
        }
        .await;
        match batch {
            Ok(applied) => match surface.commit().await {
                Ok(()) => {
                    // Alter files are consumed only after the commit, so a
                    // rolled-back batch leaves every file in place for retry.
                    for name in &applied {
                        self.store.remove_alter(env, name, kind)?;
                    }
                    Ok(Some(applied))
                }
                Err(e) => {
                    self.logger.error(&format!("commit failed: {e}"));
                    self.try_rollback(surface).await;
                    Ok(None)
                }
            },
            Err(e) => {
                self.logger.error(&format!("batch failed, rolling back: {e}"));
                self.try_rollback(surface).await;
                Ok(None)
            }
        }
    }

    /// Route for (Table, Updated): claim the list, run both alter kinds,
    /// then mirror the touched tables and drop the claim. Any failed batch
    /// releases the claim for retry.
    async fn apply_table_alters<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
    ) -> DriftResult<usize> {
        let names = if self.dry_run {
            self.store
                .read_pending(env, DdlType::Table, Status::Updated)?
        } else {
            self.store
                .claim_pending(env, DdlType::Table, Status::Updated)?
        };
        if names.is_empty() {
            self.logger.debug("no pending tables with status updated");
            return Ok(0);
        }

        let columns = self
            .alter_batch(surface, env, AlterKind::Columns, &names)
            .await?;
        let indexes = self
            .alter_batch(surface, env, AlterKind::Indexes, &names)
            .await?;
        let (Some(columns), Some(indexes)) = (columns, indexes) else {
            self.store
                .release_pending(env, DdlType::Table, Status::Updated)?;
            return Ok(0);
        };

        // Both batches committed: refresh the destination baseline.
        let src_env = self.config.source_env(env)?.to_string();
        let mut touched: Vec<&String> = columns.iter().chain(indexes.iter()).collect();
        touched.sort();
        touched.dedup();
        if !self.dry_run {
            for name in &touched {
                let src_ddl = self.store.read_ddl(&src_env, DdlType::Table, name)?;
                self.store.write_ddl(env, DdlType::Table, name, &src_ddl)?;
            }
            self.store
                .discard_claim(env, DdlType::Table, Status::Updated)?;
        }
        Ok(touched.len())
    }

    /// Copy seed rows for each configured table, one transaction per table;
    /// a failing table never rolls back tables already seeded.
    pub async fn seed_data<S1: SqlSurface, S2: SqlSurface>(
        &self,
        src: &mut S1,
        dest: &mut S2,
    ) -> DriftResult<usize> {
        let tables = &self.config.seed_tables;
        if tables.is_empty() {
            self.logger.debug("no seed tables configured");
            return Ok(0);
        }
        let mut seeded = 0;
        for table in tables {
            if !self.is_table_exists(src, table).await {
                self.logger
                    .warn(&format!("seed table `{table}` missing at source, skipped"));
                continue;
            }
            if !self.is_table_exists(dest, table).await {
                self.logger
                    .warn(&format!("seed table `{table}` missing at destination, skipped"));
                continue;
            }
            match dest.count_rows(table).await {
                Ok(0) => {}
                Ok(n) => {
                    self.logger
                        .info(&format!("seed table `{table}` already holds {n} row(s), skipped"));
                    continue;
                }
                Err(e) => {
                    self.logger
                        .warn(&format!("cannot count rows in `{table}`, skipped: {e}"));
                    continue;
                }
            }
            let data = match src.fetch_table(table).await {
                Ok(data) => data,
                Err(e) => {
                    self.logger
                        .warn(&format!("cannot read seed rows from `{table}`, skipped: {e}"));
                    continue;
                }
            };
            if data.rows.is_empty() {
                self.logger.debug(&format!("seed table `{table}` is empty"));
                continue;
            }
            if self.dry_run {
                self.logger.info(&format!(
                    "dry-run: would insert {} row(s) into `{table}`",
                    data.rows.len()
                ));
                seeded += 1;
                continue;
            }

            if let Err(e) = dest.begin().await {
                self.logger
                    .error(&format!("cannot open transaction for `{table}`: {e}"));
                continue;
            }
            let insert = insert_statement(table, &data.columns);
            let mut failed = false;
            for row in &data.rows {
                if let Err(e) = dest.insert_row(&insert, row).await {
                    self.logger
                        .error(&format!("seeding `{table}` failed, rolling back: {e}"));
                    failed = true;
                    break;
                }
            }
            if failed {
                self.try_rollback(dest).await;
                continue;
            }
            match dest.commit().await {
                Ok(()) => {
                    self.logger.info(&format!(
                        "seeded {} row(s) into `{table}`",
                        data.rows.len()
                    ));
                    seeded += 1;
                }
                Err(e) => {
                    self.logger.error(&format!("commit failed for `{table}`: {e}"));
                    self.try_rollback(dest).await;
                }
            }
        }
        Ok(seeded)
    }

    /// Read-only catalog probe. A probe error is logged and treated as
    /// "does not exist" rather than propagated, an accepted false-negative.
    pub async fn is_table_exists<S: SqlSurface>(&self, surface: &mut S, name: &str) -> bool {
        match surface.table_exists(name).await {
            Ok(exists) => exists,
            Err(e) => {
                self.logger
                    .error(&format!("existence probe for `{name}` failed: {e}"));
                false
            }
        }
    }

    /// Abandon a claimed batch: roll back and release the claim so a retry
    /// picks the list up unchanged.
    async fn fail_batch<S: SqlSurface>(
        &self,
        surface: &mut S,
        env: &str,
        ddl_type: DdlType,
        status: Status,
        message: &str,
    ) -> DriftResult<usize> {
        self.logger.error(message);
        self.try_rollback(surface).await;
        self.store.release_pending(env, ddl_type, status)?;
        Ok(0)
    }

    async fn try_rollback<S: SqlSurface>(&self, surface: &mut S) {
        if let Err(e) = surface.rollback().await {
            self.logger.error(&format!("rollback failed: {e}"));
        }
    }

    fn audit(&self, ddl_type: DdlType, from_status: Status, env: &str, result: &DriftResult<usize>) {
        let (status, error_message, processed) = match result {
            Ok(n) => ("applied".to_string(), None, *n),
            Err(e) => ("failed".to_string(), Some(e.to_string()), 0),
        };
        let record = MigrationRecord {
            src_env: self
                .config
                .source_env(env)
                .map(String::from)
                .unwrap_or_default(),
            dest_env: env.to_string(),
            database: self
                .config
                .db_name(env)
                .map(String::from)
                .unwrap_or_default(),
            ddl_type,
            ddl_name: format!("batch:{processed}"),
            operation: format!("{ddl_type}:{from_status}"),
            status,
            error_message,
            executed_at: Utc::now(),
        };
        if let Err(e) = self.store.append_record(&record) {
            self.logger.warn(&format!("audit append failed: {e}"));
        }
    }
}
