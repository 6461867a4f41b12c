//! varsend - debug telemetry listener and test producer.
//!
//! `varsend serve` listens for framed payloads and prints them (or captures
//! them to a JSON file); `varsend send` pushes payloads to a listener.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use varsend::config::{DEFAULT_HOST, DEFAULT_PORT};
use varsend::{CaptureStore, ConsoleSink, FrameSender, Listener, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "varsend")]
#[command(about = "Length-prefixed debug telemetry listener")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen for payloads and print or capture them
    Serve(ServeArgs),
    /// Send each message as one frame
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct Endpoint {
    /// Host to bind/connect (overrides VAR_SEND_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind/connect (overrides VAR_SEND_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Poll for connections instead of blocking in accept
    #[arg(long)]
    polling: bool,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "10", requires = "polling")]
    poll_interval_ms: u64,

    /// Capture payloads to this JSON file instead of printing them
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    capture: Option<PathBuf>,

    /// Clear the capture file before serving
    #[arg(long, requires = "capture")]
    clear: bool,

    /// Largest payload a connection may announce, in bytes
    #[arg(long)]
    max_payload: Option<u32>,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Messages to send, one frame each
    #[arg(required = true)]
    messages: Vec<String>,
}

fn server_config(endpoint: &Endpoint) -> Result<ServerConfig> {
    let mut config = ServerConfig::from_env()?;
    if let Some(host) = &endpoint.host {
        config = config.host(host.clone());
    }
    if let Some(port) = endpoint.port {
        config = config.port(port);
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = server_config(&args.endpoint)?;
    if args.polling {
        config = config.polling(std::time::Duration::from_millis(args.poll_interval_ms));
    }
    if let Some(max) = args.max_payload {
        config = config.max_payload(max);
    }

    let listener = Listener::bind(&config)
        .await
        .with_context(|| format!("cannot listen on {}:{}", config.host, config.port))?;

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    };

    match args.capture {
        Some(path) => {
            let path = if path.as_os_str().is_empty() {
                CaptureStore::default_path()
            } else {
                path
            };
            let store = Arc::new(CaptureStore::new(path));
            if args.clear {
                store.clear().await?;
            }
            info!(path = %store.path().display(), "capturing payloads");

            listener.run(store.clone(), shutdown).await;
            let captured = store.list().await.map(|m| m.len()).unwrap_or(0);
            info!(captured, "capture finished");
        }
        None => {
            let console = Arc::new(ConsoleSink::stdout());
            listener.run(console.clone(), shutdown).await;

            let stats = console.stats();
            info!(
                messages = stats.messages,
                bytes = stats.bytes,
                peers = stats.peers,
                "console session finished"
            );
        }
    }

    Ok(())
}

async fn send(args: SendArgs) -> Result<()> {
    let config = server_config(&args.endpoint)?;
    let addr = config.resolve().await?;

    let mut sender = FrameSender::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {}", addr))?;

    for message in &args.messages {
        let mut payload = message.clone().into_bytes();
        if !payload.is_empty() && !payload.ends_with(b"\n") {
            payload.push(b'\n');
        }
        sender.send(&payload).await?;
    }
    sender.close().await?;

    info!(frames = sender.frames_sent(), %addr, "messages sent");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(log_level.into()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!(
        "varsend {} (default endpoint {}:{})",
        env!("CARGO_PKG_VERSION"),
        DEFAULT_HOST,
        DEFAULT_PORT
    );

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Send(args) => send(args).await,
    }
}
