use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mobile_api_rust::auth::{ClerkResolver, IdentityResolver};
use mobile_api_rust::config::AppConfig;
use mobile_api_rust::database::MongoConnector;
use mobile_api_rust::server::{self, StartupError, TcpBinder};

#[derive(Parser)]
#[command(name = "mobile-api-rust")]
#[command(about = "Backend API for the mobile app")]
#[command(version)]
struct Args {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load .env before anything reads the environment; a missing default file is fine
    let env_file = match &args.env_file {
        Some(path) => dotenvy::from_path(path).map_err(|e| format!("{}: {}", path.display(), e)),
        None => dotenvy::dotenv().map(|_| ()).or_else(|e| {
            if e.not_found() {
                Ok(())
            } else {
                Err(e.to_string())
            }
        }),
    };

    init_tracing();

    if let Err(e) = env_file {
        tracing::warn!("Could not load env file {}", e);
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting in {:?} mode", config.environment);

    let resolver: Arc<dyn IdentityResolver> = Arc::new(ClerkResolver::from_config(&config.clerk)?);

    server::start(config, resolver, &MongoConnector, &TcpBinder, server::shutdown_signal()).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
