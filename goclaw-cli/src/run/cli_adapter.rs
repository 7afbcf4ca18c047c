//! Loopback stdio adapter: stdin lines become inbound messages on the bus,
//! outbound replies print to stdout. Used for local testing of the full
//! inbound → lane → provider → outbound path without any transport.

use std::sync::Arc;

use async_trait::async_trait;
use goclaw_core::bus::{BusEvent, InboundMessage, MessageBus, OutboundMessage, Topic};
use goclaw_core::channels::{ChannelAdapter, ChannelError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const CLI_CHANNEL: &str = "cli";
const CLI_ACCOUNT: &str = "local";
const CLI_CHAT: &str = "local";

pub struct CliAdapter {
    bus: Arc<MessageBus>,
}

impl CliAdapter {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    /// Builds the inbound record for one line of stdin.
    fn inbound_from_line(line: &str) -> Option<InboundMessage> {
        let content = line.trim();
        if content.is_empty() {
            return None;
        }
        Some(InboundMessage {
            id: Uuid::new_v4().to_string(),
            channel: CLI_CHANNEL.to_string(),
            account_id: CLI_ACCOUNT.to_string(),
            sender_id: CLI_ACCOUNT.to_string(),
            chat_id: CLI_CHAT.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            metadata: serde_json::Map::new(),
            timestamp: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for CliAdapter {
    fn name(&self) -> &str {
        CLI_CHANNEL
    }

    fn account_id(&self) -> &str {
        CLI_ACCOUNT
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ChannelError> {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    _ = cancel.cancelled() => return,
                };
                match line {
                    Ok(Some(line)) => {
                        if let Some(inbound) = CliAdapter::inbound_from_line(&line) {
                            bus.publish(Topic::Inbound, BusEvent::Inbound(inbound));
                        }
                    }
                    Ok(None) | Err(_) => return,
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        // Typing fragments are invisible on a terminal; only print real text.
        if message.is_stream && message.content.is_empty() {
            return Ok(());
        }
        println!("{}", message.content);
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true
    }
}
