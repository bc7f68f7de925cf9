use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use innovator_router::core::Domain;
use innovator_router::orchestration::ReviewVerdict;
use innovator_router::transport::cli::{self, DispatchArgs, PipelineArgs};

#[derive(Parser)]
#[command(name = "innovator")]
#[command(author, version, about = "Innovator - confidence-based agent dispatch router", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a single task to the handlers of one domain
    Dispatch {
        /// Task description
        prompt: String,

        /// Target domain (planner, director, animation, film, game, render).
        /// Inferred from the prompt when omitted
        #[arg(short, long)]
        domain: Option<Domain>,

        /// Accept threshold override
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Per-invocation timeout override in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the dispatch record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a task through the full agent pipeline
    Pipeline {
        /// Task description
        prompt: String,

        /// Verdict given to every accepted render (accept, revise, redesign)
        #[arg(short, long, default_value = "accept")]
        review: ReviewVerdict,

        /// Accept threshold override
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print the pipeline run as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the registered handlers
    Agents,

    /// Show the effective configuration
    Config {
        /// Only print the configuration file path
        #[arg(long)]
        show_path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "innovator_router=debug,innovator=debug"
    } else {
        "innovator_router=info,innovator=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Dispatch {
            prompt,
            domain,
            threshold,
            timeout_ms,
            json,
        } => {
            let args = DispatchArgs {
                prompt,
                domain,
                threshold,
                timeout_ms,
                json,
            };
            cli::run_dispatch(config_path, args).await?;
        }
        Commands::Pipeline {
            prompt,
            review,
            threshold,
            json,
        } => {
            let args = PipelineArgs {
                prompt,
                review,
                threshold,
                json,
            };
            cli::run_pipeline(config_path, args).await?;
        }
        Commands::Agents => {
            cli::run_agents()?;
        }
        Commands::Config { show_path } => {
            cli::run_config(config_path, show_path)?;
        }
    }

    Ok(())
}
