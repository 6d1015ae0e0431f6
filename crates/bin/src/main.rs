use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use amity::{Node, NodeConfig, backend::InMemory};
use clap::Parser;
use signal_hook::flag as signal_flag;
use tracing_subscriber::EnvFilter;

/// Amity node daemon: serves the federation endpoints for one site.
#[derive(Parser, Debug)]
#[command(name = "amity", version, about)]
struct Args {
    /// Canonical URL of this site, as peers should know it
    #[arg(long, env = "AMITY_SITE_URL")]
    site_url: String,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3000", env = "AMITY_LISTEN")]
    listen: String,

    /// Path of the JSON state file
    #[arg(long, default_value = "amity.json", env = "AMITY_DB_FILE")]
    db_file: String,

    /// Display name presented to peers
    #[arg(long, env = "AMITY_DISPLAY_NAME")]
    display_name: Option<String>,

    /// Require this codeword on inbound friend requests
    #[arg(long, env = "AMITY_CODEWORD")]
    codeword: Option<String>,

    /// Accept legacy bearer proofs without an expiry
    #[arg(long, env = "AMITY_LEGACY_AUTH")]
    legacy_auth: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("amity=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    // Load or create the node state
    let backend = match InMemory::load_from_file(&args.db_file) {
        Ok(backend) => {
            tracing::info!("Loaded state from {}", args.db_file);
            backend
        }
        Err(e) => {
            tracing::warn!("Failed to load state: {e:?}. Starting fresh.");
            InMemory::new()
        }
    };
    let backend = Arc::new(backend);

    let mut config = NodeConfig::new(&args.site_url);
    config.display_name = args.display_name;
    config.required_codeword = args.codeword;
    config.legacy_token_auth = args.legacy_auth;

    let node = Node::new(config, backend.clone())?;
    node.start_server(&args.listen).await?;
    let address = node.server_address()?;

    println!("Amity node for {} listening on http://{address}", args.site_url);
    println!();
    println!("Available endpoints:");
    println!("  GET  /friends/v1/hello                 - discovery");
    println!("  POST /friends/v1/friend-request        - handshake step 1");
    println!("  POST /friends/v1/accept-friend-request - handshake step 3");
    println!("  POST /friends/v1/post-deleted          - tombstone notices");
    println!("  POST /friends/v1/message               - private messages");
    println!();
    println!("Press Ctrl+C to shutdown");

    // Wait for a termination signal
    let term_signal = Arc::new(AtomicBool::new(false));
    for signal in signal_hook::consts::TERM_SIGNALS {
        let _ = signal_flag::register(*signal, Arc::clone(&term_signal));
    }
    while !term_signal.load(Ordering::Relaxed) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    tracing::info!("Shutdown signal received, saving state...");
    node.stop_server().await?;
    match backend.save_to_file(&args.db_file) {
        Ok(()) => println!("\nState saved to {}", args.db_file),
        Err(e) => eprintln!("Failed to save state: {e:?}"),
    }

    println!("Server shut down");
    Ok(())
}
