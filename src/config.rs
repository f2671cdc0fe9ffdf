//! Environment configuration and connection parameters.
//!
//! Loaded from a TOML file. Each environment names one database; the
//! `[mapping]` table pairs a destination environment with the source it
//! drifts against.
//!
//! ```toml
//! store_root = "/var/lib/schemadrift"
//! dest_only_policy = "flag"
//! seed_tables = ["currencies", "countries"]
//!
//! [environments.staging]
//! host = "staging-db.internal"
//! port = 3306
//! user = "drift"
//! password = "secret"
//! database = "shop_staging"
//!
//! [environments.production]
//! host = "prod-db.internal"
//! port = 3306
//! user = "drift"
//! password = "secret"
//! database = "shop_prod"
//!
//! [mapping]
//! production = "staging"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DriftError, DriftResult};

/// Connection parameters for one environment's database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbEnv {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

fn default_port() -> u16 {
    3306
}

/// Policy for columns/indexes present only at the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestOnlyPolicy {
    /// Surface in the diff summary, never generate a DROP. The default.
    #[default]
    Flag,
    /// Generate explicit DROP fragments.
    Drop,
}

/// Full drift configuration: environments, source mapping, store location.
#[derive(Debug, Clone, Deserialize)]
pub struct DriftConfig {
    pub store_root: PathBuf,
    #[serde(default)]
    pub dest_only_policy: DestOnlyPolicy,
    #[serde(default)]
    pub seed_tables: Vec<String>,
    pub environments: HashMap<String, DbEnv>,
    /// destination env -> source env
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

impl DriftConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> DriftResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> DriftResult<Self> {
        toml::from_str(text).map_err(|e| DriftError::config(e.to_string()))
    }

    /// Default config location: `<config_dir>/schemadrift/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("schemadrift").join("config.toml"))
    }

    /// Connection parameters for the given environment.
    pub fn db_destination(&self, env: &str) -> DriftResult<&DbEnv> {
        self.environments
            .get(env)
            .ok_or_else(|| DriftError::config(format!("unknown environment '{env}'")))
    }

    /// The source environment a destination drifts against.
    pub fn source_env(&self, dest: &str) -> DriftResult<&str> {
        self.mapping
            .get(dest)
            .map(|s| s.as_str())
            .ok_or_else(|| DriftError::config(format!("no source mapped for '{dest}'")))
    }

    /// The destination environment a source feeds, if one is mapped.
    pub fn dest_env(&self, src: &str) -> DriftResult<&str> {
        self.mapping
            .iter()
            .find(|(_, s)| s.as_str() == src)
            .map(|(d, _)| d.as_str())
            .ok_or_else(|| DriftError::config(format!("no destination mapped from '{src}'")))
    }

    /// Database name of the given environment.
    pub fn db_name(&self, env: &str) -> DriftResult<&str> {
        Ok(self.db_destination(env)?.database.as_str())
    }

    /// Environment-placeholder substitution inside DDL bodies.
    ///
    /// Rewrites every other configured environment's database name to the
    /// target environment's database name, so routine bodies referencing
    /// `shop_staging.orders` land as `shop_prod.orders`.
    pub fn replace_with_env(&self, ddl: &str, env: &str) -> DriftResult<String> {
        let target_db = self.db_name(env)?.to_string();
        let mut out = ddl.to_string();
        for (name, other) in &self.environments {
            if name == env || other.database == target_db {
                continue;
            }
            out = out.replace(&other.database, &target_db);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> DriftConfig {
        DriftConfig::from_toml(
            r#"
store_root = "/tmp/drift"

[environments.staging]
host = "stage"
user = "u"
password = "p"
database = "shop_staging"

[environments.production]
host = "prod"
port = 3307
user = "u"
password = "p"
database = "shop_prod"

[mapping]
production = "staging"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_and_defaults() {
        let cfg = sample();
        assert_eq!(cfg.db_destination("staging").unwrap().port, 3306);
        assert_eq!(cfg.db_destination("production").unwrap().port, 3307);
        assert_eq!(cfg.dest_only_policy, DestOnlyPolicy::Flag);
        assert!(cfg.seed_tables.is_empty());
    }

    #[test]
    fn test_env_mapping() {
        let cfg = sample();
        assert_eq!(cfg.source_env("production").unwrap(), "staging");
        assert_eq!(cfg.dest_env("staging").unwrap(), "production");
        assert!(cfg.source_env("staging").is_err());
        assert!(matches!(
            cfg.db_destination("qa"),
            Err(DriftError::Config(_))
        ));
    }

    #[test]
    fn test_replace_with_env() {
        let cfg = sample();
        let body = "INSERT INTO shop_staging.audit SELECT * FROM shop_staging.orders";
        let out = cfg.replace_with_env(body, "production").unwrap();
        assert_eq!(
            out,
            "INSERT INTO shop_prod.audit SELECT * FROM shop_prod.orders"
        );
    }

    #[test]
    fn test_replace_with_env_noop_for_own_db() {
        let cfg = sample();
        let body = "SELECT 1";
        assert_eq!(cfg.replace_with_env(body, "production").unwrap(), body);
    }
}
