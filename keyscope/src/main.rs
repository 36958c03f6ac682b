//! Keyscope server: requests on stdin, responses on stdout.

use std::sync::Arc;

use keyscope::rpc::{Handler, Server};
use keyscope::{CliArgs, Store};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse_args();
    let config = args.load_config()?;

    let store = Arc::new(Store::new(config.store.clone()));
    if let Some(dir) = &args.open {
        store.open(dir).await?;
    }

    info!(backend = ?config.store.backend, "keyscope ready");
    let server = Server::new(Arc::new(Handler::new(Arc::clone(&store), config.clone())), &config.server);
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    store.close().await?;
    Ok(())
}
