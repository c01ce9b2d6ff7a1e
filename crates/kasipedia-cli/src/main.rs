use clap::{Parser, Subcommand};

use kasipedia_core::config::{Config, DEFAULT_API_KEY_ENV};

#[derive(Parser)]
#[command(
    name = "kasipedia",
    about = "Generated encyclopedia demo — homepage content and a live voice assistant in one binary",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on (default: 8484)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate one homepage model and print it as JSON
    Fetch,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Load config
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Serve { port } => {
            // Both collaborators need the credential; fail fast instead of
            // serving a page that can never populate.
            if config.resolve_api_key().is_none() {
                anyhow::bail!(
                    "no service credential: set {DEFAULT_API_KEY_ENV} or add provider.api_key to {}",
                    config_path.display()
                );
            }
            let bind = config.web_bind();
            let port = port.unwrap_or_else(|| config.web_port());
            tracing::info!("Starting Kasipedia on port {port}");
            kasipedia_web::start_server(config, &bind, port).await?;
        }
        Commands::Fetch => {
            let client = kasipedia_content::ContentClient::default();
            let data = client.fetch_homepage(&config).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}
