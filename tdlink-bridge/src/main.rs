//! tdlink bridge
//!
//! Runs an engine as a child process and exposes it on stdio: request
//! objects are read one per line from stdin, and every correlated response
//! and every update is written one per line to stdout. Updates are written
//! as the engine sent them; responses keep their `@extra`.

mod config;
mod engine;
mod shutdown;

use clap::Parser;
use config::ConfigLoader;
use config::file::{FileConfig, LogConfig};
use engine::spawn_engine;
use shutdown::shutdown_signal;
use std::path::PathBuf;
use std::time::Duration;
use tdlink_core::{Client, ClientBuilder, Listener};
use tdlink_sdk::Request;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on the engine's answer to `close` during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the stdout line queue.
const OUTPUT_BUFFER: usize = 1000;

/// tdlink bridge - engine requests and updates over stdio
#[derive(Parser, Debug)]
#[command(name = "tdlink-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "TDLINK_CONFIG", default_value = "./tdlink.toml")]
    config: PathBuf,

    /// Override the engine command from the configuration file
    #[arg(short, long)]
    engine: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting tdlink-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(&args.config, args.engine);
    let FileConfig {
        client: client_config,
        engine: engine_config,
        log,
        proxy,
    } = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let mut engine = spawn_engine(&engine_config).map_err(|e| {
        tracing::error!("Failed to start engine: {}", e);
        e
    })?;

    let client = ClientBuilder::new(client_config).start(engine.sink, engine.source);

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
    let writer = tokio::spawn(write_output(output_rx));
    let printer = tokio::spawn(print_updates(client.get_listener(), output_tx.clone()));

    if let Some(log) = &log {
        apply_log_config(&client, log).await;
    }
    if let Some(proxy) = &proxy {
        match client.add_proxy(proxy).await {
            Ok(response) if response.is_error() => {
                tracing::warn!("Engine rejected proxy: {}", response.data);
            }
            Ok(_) => tracing::info!("Proxy {}:{} added", proxy.server, proxy.port),
            Err(e) => tracing::warn!("Failed to add proxy: {}", e),
        }
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = forward_requests(client.clone(), output_tx) => {
            tracing::info!("stdin closed, shutting down");
        }
        status = engine.child.wait() => {
            match status {
                Ok(status) => tracing::warn!("Engine exited with {}", status),
                Err(e) => tracing::error!("Failed to wait for engine: {}", e),
            }
        }
    }

    match tokio::time::timeout(CLOSE_TIMEOUT, client.close()).await {
        Ok(Ok(_)) => tracing::info!("Engine closed"),
        Ok(Err(e)) => tracing::debug!("Engine close request failed: {}", e),
        Err(_) => tracing::warn!("Engine did not answer close within {:?}", CLOSE_TIMEOUT),
    }

    printer.abort();
    let _ = writer.await;
    drop(engine.child);
    tracing::info!("Bridge shutdown complete");

    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr; stdout carries engine traffic only.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn apply_log_config(client: &Client, log: &LogConfig) {
    if let Some(level) = log.verbosity
        && let Err(e) = client.set_log_verbosity_level(level).await
    {
        tracing::warn!("Failed to set engine log verbosity: {}", e);
    }
    if let Some(path) = &log.file
        && let Err(e) = client.set_log_stream_file(path, log.max_file_size).await
    {
        tracing::warn!("Failed to redirect engine log to {}: {}", path, e);
    }
}

/// Read requests from stdin until EOF. Each one is sent on its own task so
/// a slow request does not hold up the next line.
async fn forward_requests(client: Client, output: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Ignoring malformed request line: {}", e);
                continue;
            }
        };

        let client = client.clone();
        let output = output.clone();
        tokio::spawn(async move {
            let request_type = request.type_tag.clone();
            match client.send(request).await {
                Ok(response) => {
                    let _ = output.send(response.data).await;
                }
                Err(e) => tracing::warn!("Request {} failed: {}", request_type, e),
            }
        });
    }
}

/// Forward every update to stdout exactly as the engine sent it.
/// Responses are written by the request that caught them.
async fn print_updates(mut listener: Listener, output: mpsc::Sender<String>) {
    while let Some(event) = listener.recv().await {
        if event.is_response() {
            continue;
        }
        if output.send(event.raw().to_string()).await.is_err() {
            break;
        }
    }
}

async fn write_output(mut lines: mpsc::Receiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(mut line) = lines.recv().await {
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!("Failed to write stdout: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
}
