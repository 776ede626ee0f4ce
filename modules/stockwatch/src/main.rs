use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stockwatch::checks::{config_summary, run_checks};
use stockwatch::App;
use stockwatch_common::Config;

#[derive(Parser)]
#[command(name = "stockwatch", about = "Quick-commerce restock monitor with Telegram alerts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start monitoring until interrupted
    Start {
        /// Log messages instead of sending them to Telegram
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify environment, store configuration and Telegram connectivity
    Check,
    /// Show the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("stockwatch=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;

    match cli.command {
        Command::Start { dry_run } => start(config, dry_run).await,
        Command::Check => {
            let report = run_checks(&config).await;
            println!("{report}");
            if report.passed() {
                println!("All critical checks passed. Run `stockwatch start` to begin monitoring.");
                Ok(())
            } else {
                anyhow::bail!("Some checks failed; fix the configuration above")
            }
        }
        Command::Config => {
            print!("{}", config_summary(&config));
            Ok(())
        }
    }
}

async fn start(config: Config, dry_run: bool) -> Result<()> {
    info!("Stock monitor starting...");
    config.log_redacted();

    let app = match App::build(&config, dry_run).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = format!("{e:#}"), "Fatal startup error");
            return Err(e);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
        info!("Interrupt received");
    };

    let stats = app.run_until(shutdown).await;
    info!(completed = stats.completed, missed = stats.missed, "Stock monitor stopped");
    Ok(())
}
