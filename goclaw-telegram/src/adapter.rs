//! The adapter itself: a long-poll dispatcher feeding the bus, and the send
//! path with typing-indicator bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use goclaw_core::bus::{BusEvent, MessageBus, OutboundMessage, Topic};
use goclaw_core::channels::{Allowlist, ChannelAdapter, ChannelError, TypingIndicator};
use teloxide::dispatching::{Dispatcher, ShutdownToken};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::convert::inbound_from_message;
use crate::TelegramSettings;

const CHANNEL_NAME: &str = "telegram";
/// Typing tokens expire after this long without a matching send.
const TYPING_TTL: Duration = Duration::from_secs(30);

/// Shared with the dptree handler; everything the listener needs per update.
struct ListenerState {
    bus: Arc<MessageBus>,
    allowlist: Allowlist,
    account_id: String,
}

pub struct TelegramAdapter {
    bot: Bot,
    account_id: String,
    allowlist: Allowlist,
    typing: TypingIndicator,
    bus: Arc<MessageBus>,
    shutdown: std::sync::Mutex<Option<ShutdownToken>>,
}

impl TelegramAdapter {
    pub fn new(settings: TelegramSettings, bus: Arc<MessageBus>) -> Self {
        Self {
            bot: Bot::new(settings.token),
            account_id: settings.account_id,
            allowlist: Allowlist::new(settings.allowlist),
            typing: TypingIndicator::new(TYPING_TTL),
            bus,
            shutdown: std::sync::Mutex::new(None),
        }
    }

    fn parse_chat_id(chat_id: &str) -> Result<ChatId, ChannelError> {
        chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| ChannelError::SendFailed(format!("invalid telegram chat id {chat_id:?}")))
    }
}

async fn on_message(msg: Message, state: Arc<ListenerState>) -> ResponseResult<()> {
    let Some(inbound) = inbound_from_message(CHANNEL_NAME, &state.account_id, &msg) else {
        return Ok(());
    };
    if !state.allowlist.is_allowed(&inbound.sender_id) {
        debug!(sender_id = %inbound.sender_id, "sender not in allowlist, dropping");
        return Ok(());
    }
    state.bus.publish(Topic::Inbound, BusEvent::Inbound(inbound));
    Ok(())
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ChannelError> {
        let state = Arc::new(ListenerState {
            bus: self.bus.clone(),
            allowlist: self.allowlist.clone(),
            account_id: self.account_id.clone(),
        });

        let handler = dptree::entry().branch(Update::filter_message().endpoint(on_message));
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![state])
            .build();

        let shutdown = dispatcher.shutdown_token();
        *self.shutdown.lock().expect("shutdown slot poisoned") = Some(shutdown.clone());

        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Ok(f) = shutdown.shutdown() {
                f.await;
            }
        });
        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let token = self.shutdown.lock().expect("shutdown slot poisoned").take();
        if let Some(token) = token {
            if let Ok(f) = token.shutdown() {
                f.await;
            }
        }
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let chat = Self::parse_chat_id(&message.chat_id)?;

        // A chat-state fragment carries no text; surface it as a Telegram
        // typing action and queue a token the real send will consume.
        if message.chat_state.as_deref() == Some("typing") && message.content.is_empty() {
            self.typing.insert(&message.chat_id, message.id.clone());
            self.bot
                .send_chat_action(chat, ChatAction::Typing)
                .await
                .map_err(|e| ChannelError::SendFailed(format!("telegram chat action: {e}")))?;
            return Ok(());
        }

        if let Err(e) = self
            .bot
            .send_message(chat, message.content.clone())
            .await
            .map(|_| ())
        {
            warn!(chat_id = %message.chat_id, error = %e, "telegram send failed");
            return Err(ChannelError::SendFailed(format!("telegram send: {e}")));
        }
        self.typing.clear_one(&message.chat_id);
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowlist.is_allowed(sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(allowlist: Vec<String>) -> TelegramAdapter {
        TelegramAdapter::new(
            TelegramSettings {
                token: "123:testtoken".to_string(),
                account_id: "default".to_string(),
                allowlist,
            },
            Arc::new(MessageBus::default()),
        )
    }

    #[test]
    fn adapter_identifies_as_telegram_channel() {
        let a = adapter(Vec::new());
        assert_eq!(a.name(), "telegram");
        assert_eq!(a.account_id(), "default");
    }

    #[test]
    fn empty_allowlist_admits_everyone() {
        let a = adapter(Vec::new());
        assert!(a.is_allowed("anyone"));
    }

    #[test]
    fn allowlist_restricts_senders() {
        let a = adapter(vec!["7".to_string()]);
        assert!(a.is_allowed("7"));
        assert!(!a.is_allowed("8"));
    }

    #[test]
    fn non_numeric_chat_id_is_rejected_before_any_network_call() {
        let err = TelegramAdapter::parse_chat_id("not-a-chat").unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(_)));
    }
}
