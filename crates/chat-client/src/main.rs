//! Chat client entry point
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p chat-client
//! ```
//!
//! Configuration is loaded from environment variables. The process exits with
//! code 1 when the client asks to be restarted and 0 on an orderly exit.

use anyhow::Context;
use chat_client::Client;
use chat_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use chat_gateway::{handler_fn, DispatchEvent};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "Client failed");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        app = %config.app.name,
        env = ?config.app.env,
        intents = ?config.gateway.intents,
        "Configuration loaded"
    );

    let client = Client::builder(config)
        .on_any(handler_fn(|event: DispatchEvent| async move {
            tracing::debug!(event = %event.name, seq = ?event.sequence, "Dispatch");
        }))
        .build()
        .await
        .context("Failed to build client")?;

    let mut signals = client
        .take_supervisor_receiver()
        .context("Supervisor receiver already taken")?;

    // A failed connect has already signalled the supervisor
    if let Err(e) = client.connect().await {
        error!(error = %e, "Initial connect failed");
    }

    let signal = client.run_until_signal(&mut signals).await;
    info!(reason = signal.reason(), code = signal.exit_code(), "Supervisor signalled");
    client.shutdown().await;

    Ok(signal.exit_code())
}
