use clap::{Parser, Subcommand};
use cost_guardian::{Config, Server};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cost-guardian", about = "API usage accounting service")]
struct Cli {
    /// Path to a YAML config file (defaults to config.yaml if present)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to initialize server");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Migrate) => server.database.migrate().await.map_err(Into::into),
        None => server.run().await,
    };

    if let Err(e) = result {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}
