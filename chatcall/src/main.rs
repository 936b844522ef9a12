mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use chatcall_core::{
    bootstrap::{init_services, load_config},
    logging,
};

use server::ChatCallServer;

#[derive(Parser, Debug)]
#[command(name = "chatcall")]
#[command(about = "1:1 video call signaling service", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(long, env = "CHATCALL_CONFIG_PATH")]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration (validates and fails fast on misconfigurations)
    if let Some(path) = &args.config {
        // load_config reads this variable; the flag is a convenience alias
        std::env::set_var("CHATCALL_CONFIG_PATH", path);
    }
    let mut config = load_config()?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("ChatCall server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize services
    let services = init_services(&config)?;

    // 4. Start the server and wait for a shutdown signal
    let server = ChatCallServer::new(config, services);
    server.start().await?;

    Ok(())
}
