//! vizbridge command-line driver
//!
//! Answers data questions with the best matching chart from either platform,
//! rebuilds workbook dashboards as semantic visualizations, and converts local
//! workbooks offline.
//!
//! Usage:
//!   vizbridge ask "Which region had the most sales?"
//!   vizbridge rebuild --dashboard <LUID>
//!   vizbridge build-spec --workbook sales.twbx --model model.json
//!   vizbridge assets Rebuilt_Charts

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use vizbridge::catalog::{build_catalog, CatalogSource, SemanticCatalog, WorkbookCatalog};
use vizbridge::data_query::{query_with_filter_fallback, DataQuery};
use vizbridge::oracle::OpenAiOracle;
use vizbridge::rebuild::build_from_markup;
use vizbridge::semantic::model::SemanticModel;
use vizbridge::semantic::{assets_in_workspace, SemanticRestClient};
use vizbridge::workbook::{DownloadedDocument, WorkbookRestClient};
use vizbridge::{
    BridgeConfig, Notice, NoticeLevel, Notifier, QuestionAnswering, RebuildOrchestrator,
};

#[derive(Parser, Debug)]
#[command(name = "vizbridge")]
#[command(about = "Answer data questions with existing charts and rebuild them across platforms")]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(long, env = "VIZBRIDGE_CONFIG", default_value = "vizbridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pick the chart that best answers a question and comment on it
    Ask {
        question: String,

        /// Rebuild a workbook-platform answer without asking for confirmation
        #[arg(long)]
        yes: bool,

        /// Write the chart image to this file
        #[arg(long)]
        image_out: Option<PathBuf>,
    },

    /// Rebuild a workbook-platform dashboard on the semantic platform
    Rebuild {
        #[arg(long)]
        dashboard: String,
    },

    /// List every candidate chart on both platforms
    Catalog,

    /// List the downloadable dashboards and metrics of a semantic-platform workspace
    Assets { workspace: String },

    /// Convert a local workbook into a visualization document, offline
    BuildSpec {
        /// A .twb or .twbx file
        #[arg(long)]
        workbook: PathBuf,

        /// Semantic model contents as JSON
        #[arg(long)]
        model: PathBuf,

        /// Worksheet to convert; defaults to the first one
        #[arg(long)]
        worksheet: Option<String>,

        /// Label for the generated visualization
        #[arg(long)]
        label: Option<String>,
    },

    /// Query a published data source, dropping filters once if nothing comes back
    Query {
        #[arg(long)]
        datasource: String,

        /// Query document as JSON (`fields` and optional `filters`)
        #[arg(long)]
        query: PathBuf,
    },
}

/// Prints user notices on stderr.
struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Status => eprintln!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let config = if path.exists() {
        BridgeConfig::from_file(path)?
    } else {
        info!("No configuration file at {}; using defaults", path.display());
        BridgeConfig::default()
    };
    Ok(config.apply_env())
}

struct Platforms {
    workbook: Arc<WorkbookRestClient>,
    semantic: Arc<SemanticRestClient>,
}

fn connect(config: &BridgeConfig) -> anyhow::Result<Platforms> {
    config.validate()?;
    Ok(Platforms {
        workbook: Arc::new(WorkbookRestClient::from_config(config)?),
        semantic: Arc::new(SemanticRestClient::from_config(config)?),
    })
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    eprint!("{} [y/N] ", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

    match args.command {
        Command::Ask {
            question,
            yes,
            image_out,
        } => {
            let platforms = connect(&config)?;
            let oracle = Arc::new(OpenAiOracle::from_config(&config)?);
            let pipeline = QuestionAnswering::new(
                platforms.workbook,
                platforms.semantic,
                oracle.clone(),
                oracle,
                config.pipeline.clone(),
                notifier,
            );

            let answer = pipeline.answer(&question).await?;
            println!("{}\n", answer.candidate.label);
            println!("{}", answer.commentary);
            if let Some(path) = image_out {
                tokio::fs::write(&path, &answer.image).await?;
                info!("Wrote chart image to {}", path.display());
            }

            if let Some(offer) = answer.rebuild_offer {
                let prompt = format!(
                    "Rebuild \"{}\" on {}?",
                    offer.dashboard_name, config.pipeline.semantic_display_name
                );
                if yes || confirm(&prompt)? {
                    let outcome = pipeline.rebuild(&offer).await?;
                    println!("Created {}", outcome.created.label);
                    if let Some(url) = outcome.created.edit_url {
                        println!("{}", url);
                    }
                }
            }
        }

        Command::Rebuild { dashboard } => {
            let platforms = connect(&config)?;
            let orchestrator = RebuildOrchestrator::new(
                platforms.workbook,
                platforms.semantic,
                config.pipeline.clone(),
                notifier,
            );
            let outcome = orchestrator.rebuild(&dashboard).await?;
            println!("Created {}", outcome.created.label);
            if let Some(url) = outcome.created.edit_url {
                println!("{}", url);
            }
        }

        Command::Catalog => {
            let platforms = connect(&config)?;
            let workbook = WorkbookCatalog::new(platforms.workbook);
            let semantic = SemanticCatalog::new(platforms.semantic);
            let sources: [&dyn CatalogSource; 2] = [&workbook, &semantic];
            let catalog = build_catalog(&sources, notifier.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(catalog.candidates())?);
        }

        Command::Assets { workspace } => {
            let platforms = connect(&config)?;
            let assets = assets_in_workspace(platforms.semantic.as_ref(), &workspace).await?;
            info!(workspace = %workspace, count = assets.len(), "Listed workspace assets");
            println!("{}", serde_json::to_string_pretty(&assets)?);
        }

        Command::BuildSpec {
            workbook,
            model,
            worksheet,
            label,
        } => {
            let filename = workbook
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let document = DownloadedDocument {
                filename,
                bytes: tokio::fs::read(&workbook).await?,
            };
            let model: SemanticModel =
                serde_json::from_slice(&tokio::fs::read(&model).await?)?;

            let mut output = build_from_markup(&document.markup()?, worksheet.as_deref(), &model)?;
            for warning in &output.warnings {
                notifier.notify(Notice::warning(warning.message.clone())).await;
            }
            if let Some(label) = label {
                output.draft.set_label(&label);
            }
            println!("{}", serde_json::to_string_pretty(&output.draft)?);
        }

        Command::Query { datasource, query } => {
            let client = WorkbookRestClient::from_config(&config)?;
            let query: DataQuery = serde_json::from_slice(&tokio::fs::read(&query).await?)?;
            let outcome = query_with_filter_fallback(&client, &datasource, &query).await?;
            if outcome.filters_dropped {
                notifier
                    .notify(Notice::warning(
                        "No rows matched the filters; showing unfiltered results.",
                    ))
                    .await;
            }
            println!("{}", serde_json::to_string_pretty(&outcome.result.rows)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vizbridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        match e.downcast_ref::<vizbridge::BridgeError>() {
            Some(err) => eprintln!("{}", err.user_message()),
            None => match e.downcast_ref::<vizbridge::RebuildError>() {
                Some(err) => eprintln!("Rebuild stopped at {}: {}", err.stage, err.user_message()),
                None => eprintln!("{}", e),
            },
        }
        std::process::exit(1);
    }
    Ok(())
}
