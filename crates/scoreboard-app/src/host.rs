// Commands to the host runtime.
//
// The reconciler only sees the `GameHost` trait. `WsHost` issues commands
// over the shim socket and pairs each feature request with the shim's
// `features-result` reply by request id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scoreboard_core::protocol::{BridgeMessage, FeatureReply, HostCommand};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// How long to wait for the shim to answer a feature request.
pub const FEATURE_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq)]
pub enum HostError {
    #[error("host rejected the request: {0}")]
    Rejected(String),

    #[error("no reply from host within {0:?}")]
    Timeout(Duration),

    #[error("host connection is closed")]
    Disconnected,
}

#[async_trait]
pub trait GameHost: Send + Sync {
    /// Acknowledge a detected game and turn on event capture for it.
    async fn enable_capture(&self, game_id: u32) -> Result<(), HostError>;

    /// Ask the host to deliver `features` for `game_id`.
    async fn set_required_features(
        &self,
        game_id: u32,
        features: &[String],
    ) -> Result<(), HostError>;
}

type PendingReply = oneshot::Sender<Result<(), String>>;

pub struct WsHost {
    outbound: mpsc::Sender<BridgeMessage>,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingReply>>,
    reply_timeout: Duration,
}

impl WsHost {
    pub fn new(outbound: mpsc::Sender<BridgeMessage>) -> Self {
        Self::with_timeout(outbound, FEATURE_REPLY_TIMEOUT)
    }

    pub fn with_timeout(outbound: mpsc::Sender<BridgeMessage>, reply_timeout: Duration) -> Self {
        Self {
            outbound,
            next_request_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            reply_timeout,
        }
    }

    /// Resolve the request a `features-result` answers. Returns `false` for
    /// replies nobody is waiting on (late or duplicate).
    pub fn complete(&self, reply: FeatureReply) -> bool {
        let waiter = self.pending_map().remove(&reply.request_id);
        let Some(waiter) = waiter else {
            debug!("Ignoring features-result for unknown request {}", reply.request_id);
            return false;
        };

        let result = if reply.ok {
            Ok(())
        } else {
            Err(reply.error.unwrap_or_else(|| "rejected".to_string()))
        };
        let _ = waiter.send(result);
        true
    }

    /// Fail every outstanding request, e.g. when the shim disconnects.
    pub fn fail_pending(&self) {
        let drained: Vec<_> = self.pending_map().drain().collect();
        if !drained.is_empty() {
            warn!("Abandoning {} pending feature request(s)", drained.len());
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending_map().len()
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, command: HostCommand) -> Result<(), HostError> {
        self.outbound
            .send(BridgeMessage::Command(command))
            .await
            .map_err(|_| HostError::Disconnected)
    }
}

#[async_trait]
impl GameHost for WsHost {
    async fn enable_capture(&self, game_id: u32) -> Result<(), HostError> {
        self.send(HostCommand::EnableCapture { game_id }).await
    }

    async fn set_required_features(
        &self,
        game_id: u32,
        features: &[String],
    ) -> Result<(), HostError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(request_id, tx);

        if let Err(e) = self
            .send(HostCommand::SetRequiredFeatures {
                request_id,
                game_id,
                features: features.to_vec(),
            })
            .await
        {
            self.pending_map().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(HostError::Rejected(message)),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.pending_map().remove(&request_id);
                Err(HostError::Timeout(self.reply_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn next_request_id(rx: &mut mpsc::Receiver<BridgeMessage>) -> u64 {
        match rx.recv().await.unwrap() {
            BridgeMessage::Command(HostCommand::SetRequiredFeatures { request_id, .. }) => {
                request_id
            }
            other => panic!("expected SetRequiredFeatures, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enable_capture_sends_command() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = WsHost::new(tx);

        host.enable_capture(5426).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            BridgeMessage::Command(HostCommand::EnableCapture { game_id: 5426 })
        );
    }

    #[tokio::test]
    async fn feature_request_resolves_on_ok_reply() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = Arc::new(WsHost::new(tx));

        let requester = {
            let host = host.clone();
            tokio::spawn(async move {
                host.set_required_features(5426, &["live_client_data".to_string()])
                    .await
            })
        };

        let request_id = next_request_id(&mut rx).await;
        assert!(host.complete(FeatureReply {
            request_id,
            ok: true,
            error: None,
        }));

        assert_eq!(requester.await.unwrap(), Ok(()));
        assert_eq!(host.pending_count(), 0);
    }

    #[tokio::test]
    async fn feature_request_reports_rejection() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = Arc::new(WsHost::new(tx));

        let requester = {
            let host = host.clone();
            tokio::spawn(async move { host.set_required_features(5426, &[]).await })
        };

        let request_id = next_request_id(&mut rx).await;
        host.complete(FeatureReply {
            request_id,
            ok: false,
            error: Some("game not running".into()),
        });

        assert_eq!(
            requester.await.unwrap(),
            Err(HostError::Rejected("game not running".into()))
        );
    }

    #[tokio::test]
    async fn feature_request_times_out() {
        tokio::time::pause();
        let (tx, _rx) = mpsc::channel(4);
        let host = WsHost::with_timeout(tx, Duration::from_secs(2));

        let result = host.set_required_features(5426, &[]).await;

        assert_eq!(result, Err(HostError::Timeout(Duration::from_secs(2))));
        assert_eq!(host.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_pending_disconnects_waiters() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = Arc::new(WsHost::new(tx));

        let requester = {
            let host = host.clone();
            tokio::spawn(async move { host.set_required_features(5426, &[]).await })
        };
        next_request_id(&mut rx).await;

        host.fail_pending();
        assert_eq!(requester.await.unwrap(), Err(HostError::Disconnected));
    }

    #[tokio::test]
    async fn closed_outbound_is_disconnected() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let host = WsHost::new(tx);

        assert_eq!(host.enable_capture(1).await, Err(HostError::Disconnected));
        assert_eq!(
            host.set_required_features(1, &[]).await,
            Err(HostError::Disconnected)
        );
        assert_eq!(host.pending_count(), 0);
    }

    #[test]
    fn unknown_reply_is_ignored() {
        let (tx, _rx) = mpsc::channel(4);
        let host = WsHost::new(tx);
        assert!(!host.complete(FeatureReply {
            request_id: 99,
            ok: true,
            error: None,
        }));
    }
}
