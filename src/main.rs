//! sdk-provision CLI
//!
//! Entry point for the `sdk-provision` pipeline step.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sdk_provision::commands::{InstallCommand, KeyCommand, RestoreCommand, SaveCommand};
use sdk_provision::core::{ProvisionConfig, ProvisionError, ToolchainConfig};
use sdk_provision::toolchain::CiExporter;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sdk-provision")]
#[command(about = "Provision and cache an Android SDK toolchain", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true, env = "SDK_PROVISION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore from cache, install on a miss, save, and export the environment
    Install(ToolchainArgs),
    /// Restore the SDK home from the cache
    Restore(ToolchainArgs),
    /// Save the SDK home to the cache
    Save(ToolchainArgs),
    /// Print the cache key for the requested toolchain
    Key(ToolchainArgs),
}

/// Requested toolchain, from flags or the runner's `INPUT_*` variables
#[derive(Args, Debug, Clone)]
struct ToolchainArgs {
    /// Platform API level, e.g. 33
    #[arg(long, env = "INPUT_SDK_VERSION")]
    sdk_version: Option<String>,

    /// Build-tools version, e.g. 33.0.0
    #[arg(long, env = "INPUT_BUILD_TOOLS_VERSION")]
    build_tools_version: Option<String>,

    /// NDK version to install
    #[arg(long, env = "INPUT_NDK_VERSION")]
    ndk_version: Option<String>,

    /// CMake version to install
    #[arg(long, env = "INPUT_CMAKE_VERSION")]
    cmake_version: Option<String>,

    /// Use this cache key instead of deriving one
    #[arg(long, env = "INPUT_CACHE_KEY")]
    cache_key: Option<String>,

    /// Restore and save the SDK home through the cache (true/false)
    #[arg(long, env = "INPUT_USE_CACHE")]
    use_cache: Option<bool>,
}

impl ToolchainArgs {
    fn into_config(self) -> (ToolchainConfig, Option<bool>) {
        let toolchain = ToolchainConfig {
            sdk_version: self.sdk_version,
            build_tools_version: self.build_tools_version,
            ndk_version: self.ndk_version,
            cmake_version: self.cmake_version,
            cache_key: self.cache_key,
        };
        (toolchain, self.use_cache)
    }
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    info!("sdk-provision v{}", VERSION);

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<ProvisionError>() {
            Some(provision) => error!("{}", provision.user_message()),
            None => error!("{:#}", err),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ProvisionConfig::load_or_default(cli.config.as_deref()).await?;

    let args = match cli.command {
        Commands::Install(ref args)
        | Commands::Restore(ref args)
        | Commands::Save(ref args)
        | Commands::Key(ref args) => args.clone(),
    };
    let (inputs, use_cache) = args.into_config();
    config.merge_inputs(inputs, use_cache);

    match cli.command {
        Commands::Install(_) => {
            InstallCommand {
                config,
                exporter: CiExporter::from_env(),
            }
            .execute()
            .await?;
        }
        Commands::Restore(_) => {
            RestoreCommand {
                config,
                exporter: CiExporter::from_env(),
            }
            .execute()
            .await?;
        }
        Commands::Save(_) => {
            SaveCommand { config }.execute().await?;
        }
        Commands::Key(_) => {
            KeyCommand { config }.execute()?;
        }
    }

    Ok(())
}
