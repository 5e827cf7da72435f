use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forgehand_cli::server::{serve, AppState};
use forgehand_cli::{ForgehandConfig, ForgehandService};
use platform_adapter::FakeDriver;

#[derive(Parser)]
#[command(
    name = "forgehand",
    about = "Adaptive automation engine for a web-based low-code platform",
    version
)]
struct Cli {
    /// Path to a YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write daily-rotated logs into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Validate the configuration and exit.
    Check,
}

/// Returns the file-appender guard; it must outlive the process body or
/// buffered log lines are lost.
fn init_tracing(
    json: bool,
    log_dir: Option<&PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forgehand=debug"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "forgehand.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_json, cli.log_dir.as_ref());

    let config = ForgehandConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check => {
            println!("configuration ok");
            Ok(())
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            // The in-memory driver stands in until a real browser bridge
            // is wired behind the PlatformDriver seam.
            let driver = Arc::new(FakeDriver::new());
            let service = Arc::new(ForgehandService::new(config, driver, None)?);
            serve(AppState::new(service), &bind).await
        }
    }
}
