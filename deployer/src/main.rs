//! GliderGun - Entry Point
//!
//! Runs infrastructure deployment templates packaged as container images.

use std::collections::HashMap;
use std::env;

use glidergun::app::options::AppOptions;
use glidergun::app::run::run;
use glidergun::filesys::file::File;
use glidergun::logs::{init_logging, LogOptions};
use glidergun::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use glidergun::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize version info: {e}"),
        }
        return;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string());
    let mut settings = match Settings::load(&File::new(&settings_path)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = settings.apply_env() {
        eprintln!("Invalid environment override: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let working_dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Unable to determine the working directory: {}", e);
            std::process::exit(1);
        }
    };

    let options = match AppOptions::from_settings(&settings, &working_dir) {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Running glidergun {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run glidergun: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
