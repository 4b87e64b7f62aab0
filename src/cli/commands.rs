use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use anyhow::{Context, Result};
use log::info;

use crate::cli::error::{InternalError, TraceFailure};
use crate::cli::output::{format_trace, format_trace_json, get_terminal_width, is_tty, LiveView};
use crate::config::{Config, StageOrder};
use crate::models::TraceState;
use crate::store::TraceStore;
use crate::subscription::{Ingress, SubscriptionManager};
use crate::transport::{Delivery, ReplayTransport, Transport, WsTransport};
use crate::utils::{correlation_header, format_duration, generate_trace_id};

#[derive(Parser)]
#[command(name = "tracewatch")]
#[command(about = "Trace Watch - follow a single request through a remote gateway pipeline in real time")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a fresh trace ID and the header to attach to the monitored request
    Id,
    /// Watch a trace live over the gateway's WebSocket channel
    Watch {
        /// Trace ID to follow (a fresh one is generated when omitted)
        trace_id: Option<String>,
        /// Gateway base URL (e.g. http://localhost:8080)
        #[arg(long)]
        gateway: Option<String>,
        /// Comma-separated stage display order (e.g. "RECEIVED,AUTH,FORWARD,COMPLETE")
        #[arg(long)]
        stages: Option<String>,
        /// Give up after this long without any message (e.g. "30s", "5m")
        #[arg(long = "idle-timeout")]
        idle_timeout: Option<String>,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a recorded channel stream (one JSON message per line)
    Replay {
        /// Recording file
        file: PathBuf,
        /// Trace ID the recording was captured for
        #[arg(long = "trace")]
        trace_id: String,
        /// Comma-separated stage display order
        #[arg(long)]
        stages: Option<String>,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Id => handle_id(),
        Commands::Watch { trace_id, gateway, stages, idle_timeout, json } => {
            if let Some(url) = gateway {
                config.set_gateway_url(&url)?;
            }
            if let Some(list) = stages {
                config.stages = StageOrder::parse(&list)?;
            }
            if let Some(expr) = idle_timeout {
                config.set_idle_timeout(&expr)?;
            }
            handle_watch(config, trace_id, json)
        }
        Commands::Replay { file, trace_id, stages, json } => {
            if let Some(list) = stages {
                config.stages = StageOrder::parse(&list)?;
            }
            handle_replay(config, &file, &trace_id, json)
        }
    }
}

fn handle_id() -> Result<()> {
    let trace_id = generate_trace_id();
    println!("{}", trace_id);
    println!("{}", correlation_header(&trace_id));
    Ok(())
}

fn handle_watch(config: Config, trace_id: Option<String>, json: bool) -> Result<()> {
    let trace_id = match trace_id {
        Some(id) => id,
        None => {
            let id = generate_trace_id();
            // Operator needs this to tag the request they are about to send.
            // stderr keeps --json output parseable.
            eprintln!("Attach to your request: {}", correlation_header(&id));
            id
        }
    };

    let idle_timeout = config.idle_timeout;
    let store = TraceStore::new(&config.stages);
    let transport = WsTransport::new(config);
    watch_session(transport, store, &trace_id, idle_timeout, json)
}

fn handle_replay(config: Config, file: &std::path::Path, trace_id: &str, json: bool) -> Result<()> {
    let transport = ReplayTransport::from_file(file)?;
    info!("replaying {} payloads from {}", transport.len(), file.display());
    let store = TraceStore::new(&config.stages);
    watch_session(transport, store, trace_id, config.idle_timeout, json)
}

/// Drive one monitoring session to completion and print the final state
fn watch_session<T: Transport>(
    transport: T,
    store: TraceStore,
    trace_id: &str,
    idle_timeout: Duration,
    json: bool,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut manager = SubscriptionManager::new(transport, store, tx);

    let live = is_tty() && !json;
    let width = get_terminal_width();
    let mut view = LiveView::new();
    let mut stdout = std::io::stdout();

    let opened = manager.start_monitoring(trace_id);
    if let Err(e) = opened {
        // Seeded state is still there, marked disconnected
        if let Some(state) = manager.current_snapshot() {
            print_final(state, json, live, width, &mut view)?;
        }
        return Err(e.into());
    }

    follow(&mut manager, &rx, idle_timeout, |state| {
        if live {
            write_out(&mut stdout, &view.frame(state, width))
        } else {
            Ok(())
        }
    })?;

    let state = manager
        .current_snapshot()
        .cloned()
        .context("trace state disappeared while watching")?;
    manager.stop_monitoring();

    print_final(&state, json, live, width, &mut view)?;

    match state.trace_error {
        Some(message) => Err(TraceFailure { trace_id: state.trace_id, message }.into()),
        None => Ok(()),
    }
}

/// Pump deliveries into the manager until the trace is finished, the channel
/// goes away, or nothing arrives within `idle_timeout`
pub fn follow<T, F>(
    manager: &mut SubscriptionManager<T>,
    rx: &Receiver<Delivery>,
    idle_timeout: Duration,
    mut on_change: F,
) -> Result<()>
where
    T: Transport,
    F: FnMut(&TraceState) -> Result<()>,
{
    loop {
        let ingress = match rx.recv_timeout(idle_timeout) {
            Ok(delivery) => manager.handle(delivery),
            Err(RecvTimeoutError::Timeout) => {
                manager.abandon(&format!(
                    "no events received for {}",
                    format_duration(idle_timeout)
                ));
                Ingress::Disconnected
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        if ingress.changed_state() {
            if let Some(state) = manager.current_snapshot() {
                on_change(state)?;
            }
        }

        let finished = manager.current_snapshot().map_or(true, TraceState::is_finished);
        if finished || matches!(ingress, Ingress::Disconnected | Ingress::TraceError(_)) {
            return Ok(());
        }
    }
}

fn print_final(
    state: &TraceState,
    json: bool,
    live: bool,
    width: usize,
    view: &mut LiveView,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    let out = if json {
        format!("{}\n", format_trace_json(state)?)
    } else if live {
        view.frame(state, width)
    } else {
        format!("{}\n", format_trace(state, false, width))
    };
    write_out(&mut stdout, &out)
}

fn write_out(stdout: &mut std::io::Stdout, text: &str) -> Result<()> {
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| InternalError::io("Failed to write output", e).into())
}
