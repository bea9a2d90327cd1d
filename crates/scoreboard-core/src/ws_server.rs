// WebSocket server the overlay shim connects to.
//
// The shim runs inside the host runtime, forwards host events to us as JSON
// text frames, and relays our commands and output events back to the host
// and the scoreboard view.

use std::fmt::Display;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::BridgeMessage;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug, PartialEq)]
pub enum WsEvent {
    /// The shim has connected.
    Connected { addr: String },
    /// The shim has disconnected.
    Disconnected,
    /// A text frame from the shim (raw JSON string).
    Message(String),
}

/// Bind the listener on `127.0.0.1:{port}`. Port 0 picks a free port.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(format!("127.0.0.1:{port}")).await
}

/// Serve one shim connection at a time, forever.
///
/// Inbound frames go to `tx`; `outbound` messages are written to the
/// connected client. Messages queued while nobody is connected are dropped.
/// Returns when either channel's other end is gone.
pub async fn run(
    listener: TcpListener,
    tx: mpsc::Sender<WsEvent>,
    mut outbound: mpsc::Receiver<BridgeMessage>,
) -> anyhow::Result<()> {
    info!("WebSocket server listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            dropped = outbound.recv() => {
                match dropped {
                    Some(msg) => {
                        debug!("No shim connected, dropping {:?}", msg);
                        continue;
                    }
                    None => return Ok(()),
                }
            }
        };
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr_str}: {e}");
                continue;
            }
        };

        if tx
            .send(WsEvent::Connected {
                addr: addr_str.clone(),
            })
            .await
            .is_err()
        {
            break;
        }

        let (mut write, read) = ws_stream.split();
        if serve_connection(read, &mut write, &tx, &mut outbound, &addr_str)
            .await
            .is_err()
        {
            break;
        }

        if tx.send(WsEvent::Disconnected).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Pump one connection: forward inbound text frames to `tx` and write
/// `outbound` messages to `write` until the client goes away.
///
/// Returns `Err(())` if either channel is closed, signalling the caller to
/// stop. Generic over the stream and sink so it can be tested in memory.
pub async fn serve_connection<St, Si>(
    mut read: St,
    write: &mut Si,
    tx: &mpsc::Sender<WsEvent>,
    outbound: &mut mpsc::Receiver<BridgeMessage>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(WsEvent::Message(text.to_string())).await.is_err() {
                            return Err(());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {addr} sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {addr}: {e}");
                        break;
                    }
                    None => break,
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame.
                    }
                }
            }
            outgoing = outbound.recv() => {
                let Some(msg) = outgoing else {
                    return Err(());
                };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode outbound message: {e}");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!("Failed to write to {addr}: {e}");
                    break;
                }
            }
        }
    }
    Ok(())
}
