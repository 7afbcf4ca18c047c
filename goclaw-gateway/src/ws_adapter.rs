//! The gateway's own channel adapter: outbound messages addressed to
//! `(channel="ws", chat_id=<connection session id>)` are delivered to the
//! matching live WebSocket connection as a `message` notification.
//!
//! Browser-originated turns enter through the `chat.send` RPC, which publishes
//! an `InboundMessage` with `channel="ws"` and the connection's session id as
//! both sender and chat id, so replies route straight back here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use goclaw_core::bus::OutboundMessage;
use goclaw_core::channels::{ChannelAdapter, ChannelError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) const WS_CHANNEL: &str = "ws";
pub(crate) const WS_ACCOUNT: &str = "gateway";

/// Routes outbound bus messages to connected control-plane clients.
#[derive(Default)]
pub struct WsAdapter {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<OutboundMessage>>>,
}

impl WsAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live connection under its session id and returns the
    /// receiving half the connection loop drains.
    pub(crate) fn register(&self, session_id: &str) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .expect("ws client map poisoned")
            .insert(session_id.to_string(), tx);
        rx
    }

    pub(crate) fn unregister(&self, session_id: &str) {
        self.clients.lock().expect("ws client map poisoned").remove(session_id);
    }
}

#[async_trait]
impl ChannelAdapter for WsAdapter {
    fn name(&self) -> &str {
        WS_CHANNEL
    }

    fn account_id(&self) -> &str {
        WS_ACCOUNT
    }

    async fn start(&self, _cancel: CancellationToken) -> Result<(), ChannelError> {
        // Connections register themselves on upgrade; nothing to listen for here.
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.clients.lock().expect("ws client map poisoned").clear();
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let clients = self.clients.lock().expect("ws client map poisoned");
        match clients.get(&message.chat_id) {
            Some(tx) => tx
                .send(message.clone())
                .map_err(|_| ChannelError::SendFailed(format!("connection {} closed", message.chat_id))),
            None => Err(ChannelError::SendFailed(format!(
                "no live connection for session {}",
                message.chat_id
            ))),
        }
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        // Admission already happened at the token check on upgrade.
        true
    }
}
