mod cli;
mod commands;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use whirlpool_engine::Engine;
use whirlpool_engine::logging::{LoggingConfig, init_logging};

use crate::cli::Args;
use crate::commands::{CommandExecutor, load_config};

const VERBOSE_FILTER: &str = "whirlpool_engine=debug,whirlpool=debug,sqlx=warn";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (logging, _guard) = match init_logging(args.log_dir.as_deref()) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(args, logging).await {
        error!("Application error: {e:#}");
        let error_json = serde_json::json!({
            "status": "error",
            "message": format!("{e:#}"),
        });
        println!("{error_json}");
        process::exit(1);
    }
}

async fn run(args: Args, logging: Arc<LoggingConfig>) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.db)?;
    debug!(?config, "Loaded configuration");

    let engine = Engine::new(config).await?;

    // A persisted directive applies unless --verbose asks for more.
    logging
        .apply_persisted_filter(&*engine.settings().repository())
        .await;
    if args.verbose {
        logging.set_filter(VERBOSE_FILTER)?;
    }
    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.clone());

    let executor = CommandExecutor::new(engine.clone(), args.compact);
    let result = executor.execute(args.command).await;

    cancel.cancel();
    engine.shutdown().await;
    result
}
