use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use thunt::commands::{
    hub::run_hub, manager::run_manager, score::run_score, Cli, Commands,
};
use thunt::config::HuntConfig;
use thunt::logging::init_logger;
use thunt::manager::HuntManager;
use thunt::monitor::run_worker;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match HuntConfig::load() {
        Ok(config) => config.with_root(cli.root.clone()),
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let level = cli.log_level.as_deref().or(config.log_level.as_deref());
    if let Err(err) = init_logger(level, config.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {err:#}");
    }

    match main_impl(cli.command, config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn main_impl(command: Commands, mut config: HuntConfig) -> Result<ExitCode> {
    match command {
        Commands::Hub => {
            run_hub(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Monitor { shutdown_grace_ms } => {
            if let Some(ms) = shutdown_grace_ms {
                config.shutdown_grace_ms = ms;
            }
            run_worker(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Score { hunt } => {
            let code = run_score(&config.root, &hunt, &mut std::io::stdout());
            Ok(ExitCode::from(code))
        }
        Commands::Manager(action) => {
            let manager = HuntManager::new(&config.root);
            run_manager(&manager, action, &mut std::io::stdout())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
