//! weft daemon binary
//!
//! Loads configuration and key material, starts the UDP listeners, sends
//! the initial discovery Hello, and runs the engine until interrupted.
//! `--genkeys` generates fresh key material and exits instead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};
use weft::{
    generate_tunnel_keypair, identity::encode_key, payload_channel, Config, Identity, Node,
    UdpTransport, WgProvisioner,
};

/// weft mesh overlay daemon
#[derive(Parser, Debug)]
#[command(name = "weft", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Physical network interface to operate on
    #[arg(short, long)]
    interface: Option<String>,

    /// Path to the base64 public key file
    #[arg(long, value_name = "FILE")]
    public_key: Option<PathBuf>,

    /// Path to the base64 private key file
    #[arg(long, value_name = "FILE")]
    private_key: Option<PathBuf>,

    /// Generate signing keys and quit
    #[arg(long)]
    genkeys: bool,

    /// With --genkeys, also generate a WireGuard tunnel keypair (needs wg)
    #[arg(long, requires = "genkeys")]
    tunnel: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    if args.genkeys {
        genkeys(args.tunnel).await;
        return;
    }

    // Load configuration
    let (mut config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    // CLI flags override config values
    if args.interface.is_some() {
        config.node.interface = args.interface;
    }
    if args.public_key.is_some() {
        config.node.public_key_file = args.public_key;
    }
    if args.private_key.is_some() {
        config.node.private_key_file = args.private_key;
    }

    let Some(interface) = config.node.interface.clone() else {
        error!("No interface configured; pass --interface or set node.interface");
        std::process::exit(1);
    };

    let identity = match config.create_identity() {
        Ok(identity) => identity,
        Err(e) => {
            error!("Failed to load identity: {}", e);
            std::process::exit(1);
        }
    };

    info!(public_key = %identity.public_key(), interface = %interface, "identity loaded");

    // Bind the control socket and start the listeners
    let transport = match UdpTransport::bind(config.node.control.bind_addr()).await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to bind control socket: {}", e);
            std::process::exit(1);
        }
    };

    let (payload_tx, payload_rx) = payload_channel(64);
    transport.spawn_unicast_listener(&interface, payload_tx.clone());

    let multicast_port = config.node.control.multicast_port();
    if let Err(e) =
        UdpTransport::spawn_multicast_listener(&interface, multicast_port, payload_tx)
    {
        error!("Failed to join discovery multicast group: {}", e);
        std::process::exit(1);
    }

    let node = Node::new(
        identity,
        transport.clone(),
        Arc::new(WgProvisioner::new()),
        config,
    );

    // Announce ourselves, then serve until interrupted
    if let Err(e) = node.send_hello(&interface).await {
        error!("Failed to send initial hello: {}", e);
        std::process::exit(1);
    }

    info!("weft running, press Ctrl+C to exit");

    tokio::select! {
        _ = node.run(payload_rx) => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    info!("weft shutdown complete");
}

/// Generate and print fresh key material.
async fn genkeys(with_tunnel_keys: bool) {
    let identity = Identity::generate();

    println!("public key:  {}", encode_key(identity.public_key().as_bytes()));
    println!("private key: {}", encode_key(&identity.keypair_bytes()));

    if with_tunnel_keys {
        match generate_tunnel_keypair().await {
            Ok((public, private)) => {
                println!("tunnel public key:  {}", public);
                println!("tunnel private key: {}", private);
            }
            Err(e) => {
                error!("Failed to generate tunnel keypair: {}", e);
                std::process::exit(1);
            }
        }
    }
}
