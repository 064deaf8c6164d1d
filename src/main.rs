use std::sync::Arc;

use clap::Parser;
use credrefresh::{
    cli::Cli,
    config::AppConfig,
    coordination::RefreshCoordinator,
    observability::{init_observability, log_config_info},
    secrets::VaultCredentialProvider,
    storage::{PgConnectionFactory, PgUserLookup},
    Result, APP_NAME, VERSION,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load .env file if it exists; must happen before configuration is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Startup failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting credential refresher");
    log_config_info(&config);

    let provider = Arc::new(VaultCredentialProvider::new(config.vault.clone()).await?);
    let factory = Arc::new(PgConnectionFactory::new(config.database.clone())?);
    let executor = Arc::new(PgUserLookup::new(config.database.lookup_user.clone()));

    let running =
        RefreshCoordinator::new(config.coordinator.clone(), provider, factory, executor)?.launch();

    let report = running
        .supervise(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for interrupt");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(
        exit = ?report.exit,
        workers = report.workers.len(),
        queries_ok = report.workers.iter().map(|w| w.queries_ok).sum::<u64>(),
        "Shutting down"
    );

    Ok(report.exit.exit_code())
}
