//! schemadrift — schema drift CLI
//!
//! Compares a destination environment's schema against its mapped source,
//! then applies the resulting pending lists as transactional batches.
//!
//! # Usage
//!
//! ```bash
//! # Classify drift for every object type
//! schemadrift compare --env production
//!
//! # Apply new functions, showing statements first
//! schemadrift migrate --env production --ddl-type function --status new --dry-run
//! schemadrift migrate --env production --ddl-type function --status new
//!
//! # Copy configured seed tables from the mapped source
//! schemadrift seed --env production
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;

use schemadrift::prelude::*;

#[derive(Parser)]
#[command(name = "schemadrift")]
#[command(version)]
#[command(about = "MySQL schema drift detection and migration", long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config_dir>/schemadrift/config.toml)
    #[arg(short, long, env = "SCHEMADRIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify drift between an environment and its mapped source
    Compare {
        /// Destination environment
        #[arg(short, long)]
        env: String,

        /// Restrict to one object type
        #[arg(short = 't', long, value_enum)]
        ddl_type: Option<TypeArg>,
    },
    /// Apply one pending list against the destination database
    Migrate {
        /// Destination environment
        #[arg(short, long)]
        env: String,

        /// Object type to migrate
        #[arg(short = 't', long, value_enum)]
        ddl_type: TypeArg,

        /// Pending list to drain
        #[arg(short, long, value_enum, default_value = "new")]
        status: StatusArg,

        /// Log every destructive statement instead of executing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Copy configured seed tables from the mapped source
    Seed {
        /// Destination environment
        #[arg(short, long)]
        env: String,

        /// Log intended inserts instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show pending classification lists for an environment
    Status {
        /// Destination environment
        #[arg(short, long)]
        env: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Table,
    Function,
    Procedure,
    Trigger,
}

impl From<TypeArg> for DdlType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Table => DdlType::Table,
            TypeArg::Function => DdlType::Function,
            TypeArg::Procedure => DdlType::Procedure,
            TypeArg::Trigger => DdlType::Trigger,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    New,
    Updated,
    Deprecated,
    Ote,
}

impl From<StatusArg> for Status {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::New => Status::New,
            StatusArg::Updated => Status::Updated,
            StatusArg::Deprecated => Status::Deprecated,
            StatusArg::Ote => Status::Ote,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .or_else(DriftConfig::default_path)
        .ok_or_else(|| anyhow::anyhow!("no config path given and no config directory found"))?;
    let config = DriftConfig::load(&config_path)?;
    let store = FileStore::new(&config.store_root);
    let logger = TracingLogger;

    match &cli.command {
        Commands::Compare { env, ddl_type } => {
            let engine = DiffEngine::new(&store, &config, &logger);
            let types: Vec<DdlType> = match ddl_type {
                Some(t) => vec![(*t).into()],
                None => DdlType::ALL.to_vec(),
            };
            for ddl_type in types {
                let entries = engine.compare(ddl_type, env)?;
                print_entries(ddl_type, &entries);
            }
        }
        Commands::Migrate {
            env,
            ddl_type,
            status,
            dry_run,
        } => {
            let executor = MigrationExecutor::new(&store, &config, &logger, *dry_run);
            let processed = executor
                .migrate((*ddl_type).into(), (*status).into(), env)
                .await?;
            let label = if *dry_run { "would process" } else { "processed" };
            println!("{} {label} {processed} object(s)", "✓".green());
        }
        Commands::Seed { env, dry_run } => {
            let executor = MigrationExecutor::new(&store, &config, &logger, *dry_run);
            let seeded = executor.seed(env).await?;
            println!("{} seeded {seeded} table(s)", "✓".green());
        }
        Commands::Status { env } => {
            print_status(&store, env)?;
        }
    }
    Ok(())
}

fn print_entries(ddl_type: DdlType, entries: &[ClassificationEntry]) {
    if entries.is_empty() {
        println!("{ddl_type}s: {}", "no drift".dimmed());
        return;
    }
    println!("{}", format!("{ddl_type}s:").bold());
    for entry in entries {
        let status = match entry.status {
            Status::New => "new".green(),
            Status::Updated => "updated".yellow(),
            Status::Deprecated | Status::Ote => entry.status.to_string().red(),
        };
        println!("  {:<12} {}", status, entry.ddl_name);
        if !entry.diff_summary.is_empty() {
            println!("               {}", entry.diff_summary.dimmed());
        }
    }
}

fn print_status(store: &FileStore, env: &str) -> anyhow::Result<()> {
    let mut any = false;
    for ddl_type in DdlType::ALL {
        for status in [Status::New, Status::Updated, Status::Deprecated, Status::Ote] {
            let names = store.read_pending(env, ddl_type, status)?;
            if names.is_empty() {
                continue;
            }
            any = true;
            println!(
                "{} ({} pending)",
                format!("{ddl_type}.{status}").bold(),
                names.len()
            );
            for name in names {
                println!("  {name}");
            }
        }
    }
    if !any {
        println!("{}", "no pending migrations".dimmed());
    }
    Ok(())
}
