use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use spt::collaborators::{
    CollaboratorSet, CommandCapability, CommandReasoningService,
};
use spt::error::{get_error_info, ERROR_CODES};
use spt::router::TierRouter;
use spt::store::{MemoryStore, PgStateStore, StateStore};
use spt::{
    PipelineController, PipelineError, ProjectId, Result, RunOptions, StageRegistry,
};

mod config;

use config::{load_config, Config};

#[derive(Parser)]
#[command(name = "spt")]
#[command(about = "Site Property Toolkit - staged property feasibility analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: .spt/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the analysis pipeline for a project
    Run {
        /// Project id, e.g. SPT-2025-001
        project_id: String,

        /// Starting input as a JSON object with lookup_key or address
        #[arg(short, long)]
        input: Option<String>,

        /// Re-execute one stage even if its latest attempt completed
        #[arg(long)]
        force_stage: Option<u32>,

        /// Use the in-memory store (dry run, nothing persists)
        #[arg(long)]
        memory: bool,

        /// Emit the run report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the stage trail and status for a project
    Status {
        /// Project id, e.g. SPT-2025-001
        project_id: String,

        #[arg(long)]
        json: bool,
    },

    /// List the stage catalog
    Stages,

    /// Initialize the database schema
    InitDb {
        /// Database URL (overrides config)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// List protocol error codes and remediation hints
    Errors,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{err}");
            eprintln!("❌ {err} [{}]", err.code());
            if let Some((description, fix)) = get_error_info(err.code()) {
                eprintln!("   {description}");
                eprintln!("   💡 {fix}");
            }
            std::process::exit(err.exit_code());
        }
    }
}

async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            project_id,
            input,
            force_stage,
            memory,
            json,
        } => {
            let config = load_config(cli.config).await?;
            let project_id =
                ProjectId::parse(&project_id).map_err(PipelineError::InvalidProjectId)?;
            let input = match input {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::json!({}),
            };

            let store = build_store(&config, memory).await?;
            let controller = build_controller(&config, store)?;
            let options = RunOptions {
                force_stage,
                input,
                run_timeout: config.run_timeout,
                lease_ttl_ms: config.lease_ttl_ms,
            };

            let report = controller.run(&project_id, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json()?)?);
            } else {
                println!("{}", report.render_text());
            }
            Ok(status_exit_code(&report))
        }

        Commands::Status { project_id, json } => {
            let config = load_config(cli.config).await?;
            let project_id =
                ProjectId::parse(&project_id).map_err(PipelineError::InvalidProjectId)?;
            let store = build_store(&config, false).await?;
            let controller = build_controller(&config, store)?;

            let report = controller.status(&project_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json()?)?);
            } else {
                println!("{}", report.render_text());
            }
            Ok(0)
        }

        Commands::Stages => {
            let registry = StageRegistry::new();
            println!("\n📋 Stage Catalog\n");
            for def in registry.definitions() {
                let upstream = if def.preconditions.is_empty() {
                    "-".to_string()
                } else {
                    def.preconditions
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!(
                    "  {:>2}. {:<20} complexity={:<10} after=[{}]",
                    def.id.value(),
                    def.name,
                    def.complexity.as_str(),
                    upstream
                );
            }
            Ok(0)
        }

        Commands::InitDb { url } => {
            let config = load_config(cli.config).await?;
            let url = url
                .or(config.database_url)
                .ok_or_else(|| missing_database_url())?;
            let store = PgStateStore::connect(&url).await?;
            store.migrate().await?;
            println!("✅ Database schema initialized");
            Ok(0)
        }

        Commands::Errors => {
            println!("\n🚨 Error Codes\n");
            for (code, description, fix) in ERROR_CODES {
                println!("  {code:<12} {description}");
                println!("  {:<12} 💡 {fix}", "");
            }
            Ok(0)
        }
    }
}

async fn build_store(config: &Config, memory: bool) -> Result<Arc<dyn StateStore>> {
    if memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(missing_database_url)?;
    Ok(Arc::new(PgStateStore::connect(url).await?))
}

fn build_controller(config: &Config, store: Arc<dyn StateStore>) -> Result<PipelineController> {
    let router = Arc::new(TierRouter::new(config.router.clone())?);
    let collaborators = CollaboratorSet {
        reasoning: Arc::new(CommandReasoningService::new(
            config.commands.reasoning.clone(),
        )),
        property_registry: Arc::new(CommandCapability::new(
            "property_registry",
            config.commands.property_registry.clone(),
        )),
        zoning_source: Arc::new(CommandCapability::new(
            "zoning_source",
            config.commands.zoning_source.clone(),
        )),
        renderer: Arc::new(CommandCapability::new(
            "renderer",
            config.commands.renderer.clone(),
        )),
    };

    Ok(PipelineController::new(
        StageRegistry::new(),
        router,
        collaborators,
        store,
        config.retry,
    ))
}

fn missing_database_url() -> PipelineError {
    PipelineError::ConfigError(
        "database_url is not configured; set it in .spt/config.toml or DATABASE_URL".to_string(),
    )
}

const fn status_exit_code(report: &spt::RunReport) -> i32 {
    match report.status {
        spt::ProjectStatus::Complete | spt::ProjectStatus::Running => 0,
        spt::ProjectStatus::Blocked => 20,
        spt::ProjectStatus::Failed => 21,
    }
}
