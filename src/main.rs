// src/main.rs
use std::process::exit;
use anyhow::Result;
use clap::Parser;
use tracing::{info, error, Level};

use taskscope::cli::{App, Args};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Create the application and load configuration
    let mut app = App::new();
    let config_result = app.initialize_with_config(args.config.as_deref());

    // Initialize logging
    let level = match (args.verbose, app.config()) {
        (true, _) => Level::DEBUG,
        (false, Ok(config)) => config.log_level(),
        (false, Err(_)) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config_result {
        error!("Failed to initialize application: {}", e);
        exit(1);
    }
    if args.verbose {
        info!("Verbose mode enabled");
    }

    match args.command {
        Some(command) => {
            if let Err(e) = app.run_command(&command).await {
                error!("Command execution failed: {:#}", e);
                exit(1);
            }
        },
        None => {
            println!("No command specified. Use --help for available commands.");
        }
    }

    Ok(())
}
