mod backend;
mod command;
mod config;
mod transport;

use command::CommandExecutor;
use config::ServiceConfig;
use servo_core::{ChannelMaskTable, CommandTranslator};
use std::sync::Arc;
use tokio::net::TcpListener;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;

    info!("Servo service starting");
    info!("  Channels: {}", config.channel_count);
    info!("  Backend: {}", config.backend);

    // Built once, shared read-only by every request
    let masks = Arc::new(ChannelMaskTable::new(config.channel_count));
    let backend = backend::open(&config)?;
    let translator = Arc::new(CommandTranslator::new(masks, backend));
    let executor = Arc::new(CommandExecutor::new(translator));
    info!("Translator ready for {} channels", executor.channel_count());

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;

    tokio::select! {
        result = transport::serve(listener, executor) => {
            if let Err(e) = &result {
                error!("Server stopped: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
