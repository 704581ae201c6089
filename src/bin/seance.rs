//! Seance - live call-session client
//!
//! Locates the practitioner's current call, keeps its status, timer and
//! earnings reconciled against the backend, and drives the audio connection
//! through the headless transport. Session events are printed as they arrive;
//! actions are read from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Attach to the active call
//! seance --api-url https://api.example.com/api --auth-token $TOKEN
//!
//! # Attach to a specific incoming request, with push notifications
//! seance --request-id r-123 --push-url wss://push.example.com/ws --actor-id p-1
//! ```
//!
//! Commands on stdin: `accept`, `reject`, `end`, `mute`, `unmute`,
//! `retry`, `status`, `quit`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use seance_client::{
    spawn_call_session, ClientConfig, HeadlessTransport, HttpCallApi, PushClient, SessionEvent,
    SessionHandle,
};
use seance_core::{format_elapsed, RequestId};

/// Seance - live call-session client
#[derive(Parser, Debug)]
#[command(name = "seance", version, about)]
struct Args {
    /// Incoming call request to attach to (defaults to the active call)
    #[arg(short, long)]
    request_id: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// REST API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Push channel WebSocket URL
    #[arg(long)]
    push_url: Option<String>,

    /// Bearer token for the REST API
    #[arg(long)]
    auth_token: Option<String>,

    /// Practitioner id sent in the push `register` frame
    #[arg(long)]
    actor_id: Option<String>,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let path = args.config.clone().or_else(ClientConfig::default_path);
    let mut config = match &path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config.apply_env();

    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(url) = &args.push_url {
        config.push_url = Some(url.clone());
    }
    if let Some(token) = &args.auth_token {
        config.auth_token = Some(token.clone());
    }
    if let Some(actor_id) = &args.actor_id {
        config.actor_id = Some(actor_id.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("seance=info".parse()?)
                .add_directive("seance_client=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api_base_url,
        push = config.push_url.is_some(),
        "Seance starting"
    );

    let cancel_token = CancellationToken::new();
    let api = HttpCallApi::new(&config).context("Failed to build API client")?;
    let push = PushClient::spawn(&config, cancel_token.clone());
    let handle = spawn_call_session(
        config,
        Arc::new(api),
        Arc::new(HeadlessTransport::new()),
        push,
        args.request_id.map(RequestId::new),
    );

    let mut events = handle.subscribe();
    let input_handle = handle.clone();
    let input_token = cancel_token.clone();
    tokio::spawn(async move { read_commands(input_handle, input_token).await });

    let signal_handle = handle.clone();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_handle.shutdown().await;
        shutdown_token.cancel();
    });

    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SessionEvent::NavigatedAway { notice }) => {
                println!("{notice}");
                break;
            }
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event stream lagged");
                if let Ok(Some(view)) = handle.snapshot().await {
                    println!("[{}] {}", view.status_label, view.elapsed_display);
                }
            }
            Err(RecvError::Closed) => break,
        }
    }

    cancel_token.cancel();
    info!("Seance stopped");
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Located { view } => {
            let who = view.counterpart_name.as_deref().unwrap_or("unknown caller");
            println!(
                "Call with {who}: {} at {}/min",
                view.status_label, view.rate_display
            );
        }
        SessionEvent::LocateFailed { reason } => {
            println!("Could not find the call ({reason}). Type `retry` to try again.");
        }
        SessionEvent::StatusChanged { to, .. } => println!("Status: {}", to.label()),
        SessionEvent::ElapsedUpdated {
            elapsed_seconds,
            earnings,
        } => println!("{}  {}", format_elapsed(*elapsed_seconds), earnings.format()),
        SessionEvent::Countdown { time_remaining } => {
            println!("Respond within {time_remaining}s");
        }
        SessionEvent::ConnectionChanged { state } => println!("Audio: {}", state.label()),
        SessionEvent::SyncStale { stale: true } => println!("Timer sync lost, counting locally"),
        SessionEvent::SyncStale { stale: false } => println!("Timer sync restored"),
        SessionEvent::AcceptFailed { reason } => println!("Accept failed: {reason}"),
        SessionEvent::AuthRequired => println!("Authentication required"),
        SessionEvent::Terminated { status, .. } => println!("Call over: {}", status.label()),
        SessionEvent::NavigatedAway { notice } => println!("{notice}"),
    }
}

async fn read_commands(handle: SessionHandle, cancel_token: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        handle.user_gesture().await;
        let result = match line.trim() {
            "" => continue,
            "accept" => handle.accept().await,
            "reject" => handle.reject().await,
            "end" => handle.end().await,
            "mute" => handle.set_muted(true).await,
            "unmute" => handle.set_muted(false).await,
            "retry" => {
                handle.retry_locate().await;
                Ok(())
            }
            "status" => {
                match handle.snapshot().await {
                    Ok(Some(view)) => println!(
                        "[{}] {}  {}  audio: {}",
                        view.status_label,
                        view.elapsed_display,
                        view.earnings_display,
                        view.connection_state.label()
                    ),
                    Ok(None) => println!("Call not located yet"),
                    Err(e) => println!("{e}"),
                }
                Ok(())
            }
            "quit" => {
                handle.shutdown().await;
                cancel_token.cancel();
                break;
            }
            other => {
                println!("Unknown command: {other}");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{e}");
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
