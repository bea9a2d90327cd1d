// Application event loop: the single place session state is mutated.
//
// Shim frames and poll outcomes arrive on separate channels and are handled
// one at a time, so the reconciler never sees two transitions interleave.

use std::sync::Arc;

use scoreboard_core::protocol::{parse_host_message, HostMessage};
use scoreboard_core::ws_server::WsEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::host::WsHost;
use crate::poller::PollOutcome;
use crate::reconciler::Reconciler;

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. WebSocket events from the shim
/// 2. Poll outcomes from the live client poller
///
/// Returns once the WebSocket channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut poll_rx: mpsc::Receiver<PollOutcome>,
    mut reconciler: Reconciler,
    host: Arc<WsHost>,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // Once the poll channel closes, stop selecting on it so the loop never
    // spins on a closed receiver.
    let mut poll_open = true;

    loop {
        tokio::select! {
            // --- WebSocket events ---
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { addr }) => {
                        info!("Shim connected from {}", addr);
                        reconciler.startup();
                    }
                    Some(WsEvent::Disconnected) => {
                        info!("Shim disconnected");
                        host.fail_pending();
                        reconciler.handle_disconnect();
                    }
                    Some(WsEvent::Message(json_str)) => {
                        handle_ws_message(&mut reconciler, &host, &json_str);
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Poll outcomes (only while the channel is open) ---
            outcome = poll_rx.recv(), if poll_open => {
                match outcome {
                    Some(outcome) => reconciler.handle_poll_outcome(outcome),
                    None => {
                        info!("Poll channel closed");
                        poll_open = false;
                    }
                }
            }
        }
    }

    reconciler.shutdown();
    host.fail_pending();
    info!("Application event loop exiting");
    Ok(())
}

/// Handle one inbound text frame from the shim.
fn handle_ws_message(reconciler: &mut Reconciler, host: &WsHost, json_str: &str) {
    let msg = match parse_host_message(json_str) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse shim message: {}", e);
            return;
        }
    };

    match msg {
        HostMessage::FeaturesResult(reply) => {
            host.complete(reply);
        }
        HostMessage::Event(event) => {
            debug!(game_id = event.game_id(), "Host event");
            reconciler.handle_host_event(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
