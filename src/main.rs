//! CLI entrypoint for AUR package risk evaluation and install gating.

mod analyzer;
mod aur;
mod cache;
mod config;
mod gate;
mod report;
mod resolver;
mod service;
mod trust;

use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use cache::AnalysisCache;
use config::SafeAurConfig;
use gate::{GateDecision, StdinConfirmation};
use service::{PipelineError, SafeAurService};
use trust::{score_trust, GitRepositoryInspector, MaintainerSignal, RepositoryInspector};

#[derive(Parser)]
#[command(
    name = "safe-aur",
    version,
    about = "Security analysis gate for AUR package installs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze packages and gate the install decision
    Install {
        /// Package names to evaluate
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Run the analysis pipeline for one package and print the verdict
    Analyze {
        /// Package name
        package: String,
    },
    /// Score repository trust for one package
    Trust {
        /// Package name
        package: String,
    },
    /// Inspect or maintain the verdict cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print aggregate cache statistics as JSON
    Stats,
    /// List cached content identifiers for a package as JSON
    List {
        /// Package name
        package: String,
    },
    /// Remove cache records older than the retention window
    Prune {
        /// Maximum record age in days (defaults to the configured retention)
        #[arg(long)]
        days: Option<u64>,
    },
    /// Remove every cache record
    Clear,
}

fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Stop flag flipped by Ctrl-C; in-flight pipeline work observes it at the
/// next await point.
fn spawn_stop_flag() -> watch::Receiver<bool> {
    let (stop, cancel) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling in-flight work");
            let _ = stop.send(true);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = SafeAurConfig::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Install { packages } => {
            let service = SafeAurService::from_config(config.clone())?;
            let thresholds = config.policy_thresholds();
            let cancel = spawn_stop_flag();
            let color = use_color();

            for package in &packages {
                let evaluation = match service.evaluate(package, cancel.clone()).await {
                    Ok(evaluation) => evaluation,
                    Err(PipelineError::Cancelled { .. }) => {
                        eprintln!("evaluation of '{package}' cancelled");
                        return Ok(ExitCode::FAILURE);
                    }
                    Err(err) => return Err(err.into()),
                };

                println!("{}", report::render_verdict(&evaluation.verdict, evaluation.cached, color));
                if let Some(trust) = &evaluation.trust {
                    println!();
                    println!("{}", report::render_trust(trust, color));
                }
                println!();

                match gate::resolve(&evaluation.verdict, &thresholds, &mut StdinConfirmation) {
                    GateDecision::Proceed { warned } => {
                        if warned {
                            println!("'{package}' approved after review; proceed with your AUR helper");
                        } else {
                            println!("'{package}' approved; proceed with your AUR helper");
                        }
                    }
                    GateDecision::Cancelled => {
                        println!("installation of '{package}' cancelled");
                        return Ok(ExitCode::FAILURE);
                    }
                    GateDecision::Blocked { severity, findings } => {
                        println!(
                            "installation of '{package}' blocked at {severity} severity ({} finding(s))",
                            findings.len()
                        );
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
        }
        Commands::Analyze { package } => {
            let service = SafeAurService::from_config(config)?;
            let cancel = spawn_stop_flag();
            let evaluation = service.evaluate(&package, cancel).await?;
            println!("{}", report::render_verdict(&evaluation.verdict, evaluation.cached, use_color()));
            if let Some(trust) = &evaluation.trust {
                println!();
                println!("{}", report::render_trust(trust, use_color()));
            }
        }
        Commands::Trust { package } => {
            let inspector = GitRepositoryInspector::new();
            let repo = inspector.inspect(&package).await?;
            let signal = MaintainerSignal::placeholder(&repo.maintainer);
            let trust = score_trust(&repo, &signal);
            println!("{}", report::render_trust(&trust, use_color()));
        }
        Commands::Cache { command } => {
            let cache = AnalysisCache::open().context("failed to open the analysis cache")?;
            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats()?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                CacheCommands::List { package } => {
                    let identifiers = cache.list_identifiers(&package)?;
                    println!("{}", serde_json::to_string_pretty(&identifiers)?);
                }
                CacheCommands::Prune { days } => {
                    let days = days.unwrap_or(config.cache.max_age_days);
                    let removed = cache.prune(Duration::from_secs(days * 24 * 60 * 60))?;
                    println!("removed {removed} cache record(s) older than {days} day(s)");
                }
                CacheCommands::Clear => {
                    let removed = cache.prune(Duration::ZERO)?;
                    println!("removed {removed} cache record(s)");
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
