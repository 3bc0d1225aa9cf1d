mod catalog_cmds;
mod config;
mod plan_cmds;
mod run_cmds;
mod serve_cmd;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};

use slipway_core::catalog::Catalog;
use slipway_db::pool;

use config::SlipwayConfig;

#[derive(Parser)]
#[command(name = "slipway", about = "Production and reaction planning engine")]
struct Cli {
    /// Database URL (overrides SLIPWAY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Catalog TOML file (overrides SLIPWAY_CATALOG env var)
    #[arg(long, global = true)]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a slipway config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/slipway")]
        db_url: String,
        /// Path to the catalog TOML file
        #[arg(long = "catalog-path")]
        catalog_path: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the slipway database (create + migrate)
    DbInit,
    /// Catalog inspection
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Run lifecycle management
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Serve the HTTP planning API
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8460")]
        listen: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Validate the catalog file and print a summary
    Check,
    /// List catalog items with their producers
    Info,
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Compute and persist a plan for an item
    Create {
        /// Target item id
        item: i64,
        /// Target quantity
        quantity: i64,
        /// Optimization mode: minimize-cost or minimize-time
        #[arg(long)]
        optimization: Option<String>,
        /// JSON file with the resolution context (owned blueprints,
        /// reachable systems, prices, policy flags)
        #[arg(long)]
        context: Option<String>,
        /// Plan name (defaults to "<item name> x<quantity>")
        #[arg(long)]
        name: Option<String>,
        /// Owning character or corporation
        #[arg(long, default_value = "operator")]
        owner: String,
    },
    /// Show plan details (or list all plans)
    Show {
        /// Plan ID to show (omit to list all)
        plan_id: Option<String>,
    },
    /// Show a plan's aggregated raw-material list
    Materials {
        /// Plan ID
        plan_id: String,
    },
}

#[derive(Subcommand)]
pub enum RunCommands {
    /// Instantiate a run from a plan
    Start {
        /// Plan ID to instantiate
        plan_id: String,
    },
    /// Show run status and step progress (omit run_id to list all runs)
    Status {
        /// Run ID to show (omit to list all)
        run_id: Option<String>,
    },
    /// Report that production started for a step
    StepStart {
        run_id: String,
        step_id: String,
    },
    /// Report that production finished for a step
    StepComplete {
        run_id: String,
        step_id: String,
        /// Actual quantity produced, when it differs from the plan
        #[arg(long)]
        actual_quantity: Option<i64>,
    },
    /// Cancel a step (cascades to incomplete dependents)
    StepCancel {
        run_id: String,
        step_id: String,
    },
}

/// Execute the `slipway init` command: write config file.
fn cmd_init(db_url: &str, catalog_path: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        catalog: config::CatalogSection {
            path: catalog_path.map(str::to_owned),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(catalog) = catalog_path {
        println!("  catalog.path = {catalog}");
    }
    println!();
    println!("Next: run `slipway db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `slipway db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = SlipwayConfig::resolve(cli_db_url, None)?;

    println!("Initializing slipway database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("slipway db-init complete.");
    Ok(())
}

/// Load the catalog configured for this invocation.
fn load_catalog(resolved: &SlipwayConfig) -> anyhow::Result<Catalog> {
    let path = resolved.require_catalog()?;
    Catalog::load(path)
        .map_err(|e| anyhow::anyhow!("failed to load catalog {}: {e}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            catalog_path,
            force,
        } => {
            cmd_init(&db_url, catalog_path.as_deref(), force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Catalog { command } => {
            let resolved = SlipwayConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let catalog = load_catalog(&resolved)?;
            catalog_cmds::run_catalog_command(command, &catalog)?;
        }
        Commands::Plan { command } => {
            let resolved = SlipwayConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Run { command } => {
            let resolved = SlipwayConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_cmds::run_run_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { listen } => {
            let resolved = SlipwayConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let catalog = Arc::new(load_catalog(&resolved)?);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(db_pool.clone(), catalog, &listen).await;
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
