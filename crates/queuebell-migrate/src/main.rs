//! QueueBell migration binary.
//!
//! ```bash
//! FIREBASE_DB_URL=https://... queuebell-migrate --slug=cafe --dry
//! FIREBASE_DB_URL=https://... queuebell-migrate --map=tenants.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use queuebell_core::{config, Config, ConfigError};
use queuebell_migrate::{load_map, run, MigrateError, MigrationTarget, NodeStatus};
use queuebell_persistence::{FirebaseDb, RealtimeDb};
use tracing_subscriber::EnvFilter;

/// Copy single-tenant data into tenants/{slug}
#[derive(Parser, Debug)]
#[command(name = "queuebell-migrate")]
#[command(about = "Move legacy QueueBell nodes under a tenant namespace")]
struct Args {
    /// Tenant to migrate the legacy root into
    #[arg(long, conflicts_with = "map")]
    slug: Option<String>,

    /// JSON file mapping tenant slugs to legacy source paths
    #[arg(long)]
    map: Option<PathBuf>,

    /// Legacy root path used with --slug (default: database root)
    #[arg(long, default_value = "")]
    source: String,

    /// Print the plan without writing
    #[arg(long)]
    dry: bool,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn targets(args: &Args) -> Result<Vec<MigrationTarget>, MigrateError> {
    match (&args.slug, &args.map) {
        (Some(slug), _) => Ok(vec![MigrationTarget::new(slug, &args.source)?]),
        (None, Some(path)) => load_map(path),
        (None, None) => Err(MigrateError::NoTarget),
    }
}

async fn migrate(args: &Args) -> Result<(), MigrateError> {
    let targets = targets(args)?;
    let settings = Config::from_env()?;
    let url = settings
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("FIREBASE_DB_URL"))?;
    let db: Arc<dyn RealtimeDb> = Arc::new(FirebaseDb::new(url, settings.database_secret.clone())?);

    let report = run(&db, &targets, args.dry).await?;
    for (target, nodes) in &report {
        let source = if target.source.is_empty() { "/" } else { target.source.as_str() };
        println!("tenants/{} <- {}", target.slug, source);
        for node in nodes {
            let detail = match node.status {
                NodeStatus::Copy => format!("{} entries", node.children),
                NodeStatus::Exists => "already present, kept".to_string(),
                NodeStatus::Missing => String::new(),
            };
            println!("  {:<16} {:<8} {}", node.node, node.status, detail);
        }
    }
    if args.dry {
        println!("dry run: nothing written");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    config::load_env_files();

    let filter = match args.verbose {
        0 => "queuebell_migrate=info,queuebell_persistence=warn",
        1 => "queuebell_migrate=debug,queuebell_persistence=info",
        2 => "queuebell_migrate=trace,queuebell_persistence=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match migrate(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Migration failed");
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
