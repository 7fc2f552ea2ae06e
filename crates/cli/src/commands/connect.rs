//! Connect Command
//!
//! Runs a full session in the foreground until interrupted.

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use vmdesk_common::{KvStore, SessionPhase};
use vmdesk_session::ws::WebSocketConnector;
use vmdesk_session::{
    HttpCatalogFetcher, ListRefreshScheduler, RefreshOutcome, SessionConfig, SessionController,
    SessionDeps, SessionEvent, SwitchOutcome,
};

use crate::output::{print_error, print_info, print_success, print_warning};
use crate::terminal::{TerminalPrompts, TerminalSurface};

#[derive(Parser)]
pub struct ConnectArgs {
    /// VM code. Without one the session picks a VM itself.
    pub code: Option<String>,

    /// Navigation path to resolve as a deep link, e.g. /vm/10
    #[arg(long, conflicts_with = "code")]
    pub path: Option<String>,

    /// Navigation query the session was opened with
    #[arg(long, default_value = "")]
    pub query: String,

    /// Show the rules even if already accepted
    #[arg(long)]
    pub rules: bool,
}

pub async fn execute(args: ConnectArgs, config: SessionConfig) -> Result<()> {
    let store = KvStore::open(&config.store_path)?;
    let fetcher = Arc::new(HttpCatalogFetcher::from_config(&config)?);
    let deps = SessionDeps::new(
        Arc::new(TerminalPrompts),
        Arc::new(TerminalSurface),
        Arc::new(WebSocketConnector::new()),
        store,
    );

    let controller = SessionController::new(config, deps, &args.query);
    let refresh = ListRefreshScheduler::new(controller.clone(), fetcher);
    let mut events = controller.context().subscribe();

    match refresh.refresh_once().await {
        RefreshOutcome::Updated(count) => print_info(&format!("Loaded {} VMs", count)),
        RefreshOutcome::OriginDown | RefreshOutcome::Stopped => {
            bail!("The VM server is down right now, try again later")
        }
        _ => bail!("Could not load the VM list"),
    }
    refresh.start();

    let outcome = match &args.code {
        Some(code) => controller.select(code, args.rules).await,
        None => controller.start(args.path.as_deref()).await,
    };
    debug!("Initial selection: {:?}", outcome);

    if let Some(note) = initial_outcome(&outcome, controller.phase())? {
        print_warning(note);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Status(message)) => print_info(&message),
                Ok(SessionEvent::PhaseChanged(SessionPhase::Connected)) => {
                    if let Some(code) = controller.selected() {
                        print_success(&format!("Session live on {}", code));
                    }
                }
                Ok(SessionEvent::PhaseChanged(phase)) if phase.is_terminal() => {
                    print_warning(&format!("Session ended: {}", phase));
                    break;
                }
                Ok(SessionEvent::EmergencyActivated) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} session events", skipped),
                Err(RecvError::Closed) => {
                    print_error("Session closed");
                    break;
                }
            }
        }
    }

    refresh.stop();
    controller.disconnect();
    Ok(())
}

/// Fail on a selection that went nowhere. Returns a note for outcomes the
/// session's own status events do not explain.
fn initial_outcome(outcome: &SwitchOutcome, phase: SessionPhase) -> Result<Option<&'static str>> {
    match outcome {
        SwitchOutcome::Started
        | SwitchOutcome::Embedded
        | SwitchOutcome::Failed
        | SwitchOutcome::Deferred => Ok(None),
        SwitchOutcome::Dropped => Ok(Some(
            "Another switch was already in progress; this selection was ignored",
        )),
        SwitchOutcome::Halted => bail!("Session halted ({})", phase),
        SwitchOutcome::Denied => bail!("Access denied"),
        SwitchOutcome::Declined => bail!("Rules declined and no other VM is available"),
        SwitchOutcome::Cancelled => bail!("Password entry cancelled"),
        SwitchOutcome::Unsupported => bail!("No such VM"),
    }
}
