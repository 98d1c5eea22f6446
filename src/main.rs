mod benchmark;
mod cli;
mod config;
mod error;
mod exec_utils;
mod framework;
mod graphs;
mod http_probe;
mod parsers;
mod results;
mod script;
mod supervisor;
mod wrk;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::exec_utils::*;
    pub use tracing::{debug, error, info, span, trace, warn};
}

use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use prelude::*;

use crate::benchmark::Orchestrator;
use crate::config::Settings;
use crate::framework::FrameworkDescriptor;

const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = cli::Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            match tracing_subscriber::EnvFilter::try_from_default_env() {
                Ok(filter) => filter,
                Err(_) if cli.verbose => tracing_subscriber::EnvFilter::new("debug"),
                Err(_) => tracing_subscriber::EnvFilter::new("info"),
            },
        )
        .init();
    info!(
        "{} v{}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION")
    );

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &cli::Cli) -> Result<ExitCode> {
    let settings = Settings::load(cli.config.as_deref())?;

    if cli.list_frameworks {
        println!("Available frameworks:");
        for fw in &settings.frameworks {
            println!("  {:<12} {} (port {})", fw.key, fw.name, fw.port);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let benchmarks = config::load(&settings.tests)?;
    if cli.list_tests {
        println!("Available tests:");
        for def in &benchmarks {
            println!("  {:<12} {} {}", def.name, def.method, def.url);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let orchestrator = Orchestrator::new(settings, benchmarks)?;
    // Dropping the dispatch future drops the in-flight server handle, which
    // kills its process group.
    tokio::select! {
        code = dispatch(cli, &orchestrator) => code,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

async fn dispatch(cli: &cli::Cli, orchestrator: &Orchestrator) -> Result<ExitCode> {
    match (cli.framework.as_deref(), cli.test.as_deref()) {
        (Some(key), Some(name)) => {
            let framework = orchestrator.framework(key)?;
            let definition = orchestrator.benchmark(name)?;
            match orchestrator.benchmark_framework(framework, definition).await {
                Ok(summary) => {
                    info!(
                        "{} {}: {:.2} RPS",
                        framework.name, definition.name, summary.requests_per_sec
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("{} {} failed: {}", framework.name, definition.name, e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        (Some(key), None) => {
            let framework = orchestrator.framework(key)?;
            orchestrator.run_framework(framework).await;
            Ok(ExitCode::SUCCESS)
        }
        (None, Some(name)) => {
            let definition = orchestrator.benchmark(name)?;
            let frameworks: Vec<&FrameworkDescriptor> = orchestrator.frameworks().iter().collect();
            orchestrator.run_suite(definition, &frameworks, true).await;
            Ok(ExitCode::SUCCESS)
        }
        (None, None) => {
            orchestrator.run_all(!cli.skip_graphs).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
