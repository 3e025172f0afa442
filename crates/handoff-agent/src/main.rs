//! # handoff
//!
//! Terminal client for the support handoff coordinator. Loads settings,
//! resolves the channel, connects to the broker over STOMP, and drives the
//! channel from stdin.

#![deny(unsafe_code)]

mod input;
mod render;
mod supervisor;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use handoff_core::Participant;
use handoff_core::logging::{init_subscriber, init_subscriber_json};
use handoff_oracle::{AiResponder, HttpAiResponder};
use handoff_runtime::{
    ChannelConfig, ChannelContext, ChannelResolver, ChannelServices, ChannelUpdate,
    CoordinatorError, FileNonceStore, SessionRegistry,
};
use handoff_settings::{HandoffSettings, load_settings_from_path, settings_path};
use handoff_transport::{Credentials, StompConnector, TransportConnector};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::input::Input;

/// Support chat client.
#[derive(Parser, Debug)]
#[command(name = "handoff", version, about = "Support chat with AI answers and human handoff")]
struct Cli {
    /// Settings file (defaults to `~/.handoff/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Broker WebSocket URL (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Account id. Without it you chat as a guest and cannot reach an agent.
    #[arg(long)]
    user_id: Option<String>,

    /// E-mail of the account; its local part becomes your display name.
    #[arg(long, requires = "user_id")]
    email: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn participant(&self) -> Option<Participant> {
        let user_id = self.user_id.clone()?;
        Some(match &self.email {
            Some(email) => Participant::from_email(user_id, email),
            None => Participant::new(user_id),
        })
    }
}

fn load(args: &Cli) -> Result<HandoffSettings> {
    let path = args.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(url) = &args.url {
        settings.transport.url.clone_from(url);
        settings.validate().context("Invalid --url")?;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    if args.json_logs || settings.logging.json {
        init_subscriber_json(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install metrics exporter")?;
        info!(%addr, "prometheus metrics exporter listening");
    }

    let participant = args.participant();
    let store = FileNonceStore::open(settings.storage.nonce_path())
        .context("Failed to open nonce store")?;
    let resolver = ChannelResolver::new(Arc::new(store));
    let channel_id = resolver
        .resolve(participant.as_ref())
        .context("Failed to resolve channel")?;

    let cancel = CancellationToken::new();
    let connector: Arc<dyn TransportConnector> = Arc::new(StompConnector::new(
        settings.transport.url.clone(),
        settings.transport.connect_timeout(),
    ));
    let credentials = settings
        .transport
        .access_token
        .clone()
        .map_or_else(Credentials::anonymous, Credentials::bearer);
    let poll = settings.transport.reconnect_delay();
    let backoff = supervisor::Backoff::new(poll, settings.transport.reconnect_max_delay());

    info!(url = %settings.transport.url, %channel_id, "connecting");
    let Some(handle) =
        supervisor::connect_with_retry(connector.as_ref(), &credentials, &backoff, &cancel).await
    else {
        bail!("connection cancelled");
    };
    let handle = handle.context("Failed to connect to broker")?;

    let responder: Arc<dyn AiResponder> =
        Arc::new(HttpAiResponder::new(&settings.oracle).context("Failed to build responder")?);
    let services = ChannelServices::new(Arc::clone(&handle)).with_responder(responder);
    let registry = Arc::new(SessionRegistry::new(
        ChannelConfig::from_settings(&settings),
        services,
        participant,
    ));

    let _supervisor = tokio::spawn(supervisor::supervise(
        Arc::clone(&connector),
        credentials,
        Arc::clone(&registry),
        Arc::clone(&handle),
        poll,
        backoff,
        cancel.clone(),
    ));

    let mut ctx = registry.get_or_create(&channel_id).await;
    let mut printer = spawn_printer(&ctx);
    println!("{}", input::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let result = match input::parse(&line) {
            Input::Empty => Ok(()),
            Input::Help => {
                println!("{}", input::HELP);
                Ok(())
            }
            Input::Invalid(reason) => {
                println!("{reason}");
                Ok(())
            }
            Input::Quit => break,
            Input::Handoff => ctx.request_handoff().await,
            Input::Leave => ctx.leave().await,
            Input::Ask(question) => ctx.ask(question).await,
            Input::Say(text) => ctx.send_text(text).await,
            Input::Resume => {
                ctx.visibility_resumed();
                Ok(())
            }
            Input::Reset => {
                printer.abort();
                ctx = registry.reset(&channel_id).await;
                printer = spawn_printer(&ctx);
                Ok(())
            }
        };
        report(result);
    }

    info!("shutting down");
    cancel.cancel();
    registry.shutdown().await;
    registry.services().transport.current().disconnect().await;
    printer.abort();
    Ok(())
}

fn report(result: Result<(), CoordinatorError>) {
    match result {
        Ok(()) => {}
        // Already shown to the user as a notice.
        Err(CoordinatorError::UnauthorizedHandoff { .. }) => {}
        Err(CoordinatorError::Protocol(v)) => {
            debug!(violation = %v, "input ignored");
            println!("(not available right now)");
        }
        Err(e) => warn!(error = %e, category = e.category(), "command failed"),
    }
}

fn spawn_printer(ctx: &Arc<ChannelContext>) -> JoinHandle<()> {
    let mut updates = ctx.subscribe_updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Some(line) = render::render(&update, &chrono::Local::now()) {
                        println!("{line}");
                    }
                    if update == ChannelUpdate::Closed {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind"),
                Err(RecvError::Closed) => return,
            }
        }
    })
}
