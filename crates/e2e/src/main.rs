//! appcheck-auth - authentication setup for the appcheck harness
//!
//! Prepares (or removes) the cached sessions used by authenticated
//! fixtures, and checks that the application under test is reachable.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use appcheck_common::HarnessConfig;
use appcheck_e2e::{logging, probe, setup, BrowserEngine, PlaywrightEngine};

/// appcheck authentication setup
#[derive(Parser)]
#[command(name = "appcheck-auth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, env = "APPCHECK_CONFIG", default_value = "appcheck.toml", global = true)]
    config: PathBuf,

    /// Base URL of the application under test (overrides the config file)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a dedicated user and cache its session
    Setup {
        #[arg(long, value_enum, default_value = "all")]
        channel: SetupChannel,
    },

    /// Delete the cached API user and remove the cache files
    Clean,

    /// Wait until the application answers
    Probe {
        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SetupChannel {
    Api,
    Ui,
    All,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .with_env_overrides()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    config.validate()?;

    match cli.command {
        Commands::Setup { channel } => {
            if matches!(channel, SetupChannel::Api | SetupChannel::All) {
                let state = setup::api_auth(&config).await.context("API auth setup")?;
                info!("API user {} ready", state.user_email);
            }
            if matches!(channel, SetupChannel::Ui | SetupChannel::All) {
                let engine = PlaywrightEngine::launch(&config).await?;
                let outcome = setup::ui_auth(&config, &engine).await;
                engine.shutdown().await?;
                let user = outcome.context("UI auth setup")?;
                info!("UI user {} ready", user.email);
            }
        }
        Commands::Clean => setup::clean(&config).await?,
        Commands::Probe { timeout_secs } => {
            let attempts = probe::wait_until_reachable(
                &config.base_url,
                std::time::Duration::from_secs(timeout_secs),
            )
            .await?;
            println!("{} is reachable ({} attempt(s))", config.base_url, attempts);
        }
    }

    Ok(())
}
