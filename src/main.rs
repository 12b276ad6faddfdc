use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunkserv::{Args, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkserv=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match ServerConfig::from_args(&args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }

    let server = Server::bind(config.socket_addr()).await?;

    info!(port = server.local_addr().port(), "starting httpd");
    if config.chunked {
        info!(chunk_size = config.chunk_size.get(), "transfer encoding chunked");
        if config.single_chunk {
            info!("sending data in a single transmission");
        } else {
            info!("sending data in one transmission per chunk");
        }
        if !config.wait.is_zero() {
            let wait_ms = u64::try_from(config.wait.as_millis()).unwrap_or(u64::MAX);
            info!(wait_ms, "each chunk will be delayed");
        }
    }
    info!("press ctrl-c to exit");

    server
        .run_until(config, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
