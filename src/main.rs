use clap::Parser;
use std::path::PathBuf;
use wraith_c2::{C2Server, HttpC2Config};

#[derive(Parser)]
#[command(name = "wraith-c2")]
#[command(about = "Wraith C2 HTTP(S) listener - Authorized Security Testing Only")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generate default configuration file
    #[arg(long)]
    generate_config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    addr: Option<std::net::SocketAddr>,

    /// C2 domain (overrides config)
    #[arg(short, long)]
    domain: Option<String>,

    /// Serve plaintext HTTP instead of HTTPS
    #[arg(long)]
    insecure: bool,

    /// Shellcode blob for the stager route (overrides config)
    #[arg(long)]
    stage_file: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Generate config if requested
    if let Some(path) = cli.generate_config {
        let config = HttpC2Config::default();
        config.save_to_file(&path)?;
        println!("Default configuration written to: {}", path.display());
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(path) = cli.config {
        HttpC2Config::from_file(&path)?
    } else {
        HttpC2Config::default()
    };

    // Apply CLI overrides
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }
    if let Some(domain) = cli.domain {
        config.domain = domain;
    }
    if cli.insecure {
        config.secure = false;
    }
    if let Some(stage_file) = cli.stage_file {
        config.stage_file = Some(stage_file);
    }

    // Initialize logging
    wraith_c2::logging::init_logging(&cli.log_level, config.logging.format.clone());

    tracing::info!("Wraith C2 listener starting");
    tracing::info!("Bind address: {}", config.addr);
    tracing::info!("Domain: {}", config.domain);
    tracing::info!("TLS: {}", config.secure);

    let server = C2Server::new(config).await?;
    server.run().await?;

    tracing::info!("Wraith C2 shutdown complete");

    Ok(())
}
