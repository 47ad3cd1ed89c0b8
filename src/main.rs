// src/main.rs

//! # did:ipid - Main Entry Point
//!
//! Connects to an IPFS node and serves the did:ipid HTTP API.
//!
//! ## Initialization Sequence
//! 1. Load `.env` and configuration (see [`ipid::config`])
//! 2. Initialize logging (`RUST_LOG`, default `info`)
//! 3. Connect to the IPFS node, refusing to start if it is offline
//! 4. Start the API server
//!
//! ## Environment Variables
//! - `IPID_IPFS_API_URL`: (Optional) IPFS node URL (default: http://localhost:5001)
//! - `IPID_LISTEN_ADDR`: (Optional) API bind address (default: 127.0.0.1:3000)
//! - `IPID_RECORD_LIFETIME_HOURS`: (Optional) IPNS record lifetime (default: 87600)

use anyhow::Context;
use dotenv::dotenv;
use ipid::config::Settings;
use ipid::services::api_server::ApiServer;
use ipid::services::ipid::Ipid;
use ipid::storage::ipfs_client::IpfsBackend;
use log::info;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load configuration")?;
    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", settings.listen_addr))?;

    let config = settings.ipid_config().context("invalid record lifetime")?;

    let backend = IpfsBackend::new(&settings.ipfs_api_url)
        .with_context(|| format!("invalid IPFS API URL {}", settings.ipfs_api_url))?;
    let ipid = Ipid::connect(backend, config)
        .await
        .with_context(|| format!("could not reach IPFS node at {}", settings.ipfs_api_url))?;
    info!("Connected to IPFS node at {}", settings.ipfs_api_url);

    let api_server = ApiServer::new(ipid);
    info!("Available endpoints:");
    info!("- GET  /resolve-did/:did");
    info!("- POST /create-did");
    info!("- PUT  /update-did");

    api_server.run(addr).await.context("API server failed")
}
