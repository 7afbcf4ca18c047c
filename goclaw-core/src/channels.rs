//! Channel adapter framework: the per-transport driver contract,
//! admission, typing indicators, multi-account credential resolution, and the
//! outbound dispatcher that routes bus events to adapters.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, MessageBus, OutboundMessage, Topic};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("start failed: {0}")]
    StartFailed(String),
    #[error("no adapter registered for channel {channel:?} account {account_id:?}")]
    NoAdapter {
        channel: String,
        account_id: Option<String>,
    },
}

/// Each transport driver implements this contract and publishes inbound messages to
/// the bus itself.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn account_id(&self) -> &str;
    async fn start(&self, cancel: CancellationToken) -> Result<(), ChannelError>;
    async fn stop(&self) -> Result<(), ChannelError>;
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
    fn is_allowed(&self, sender_id: &str) -> bool;
}

/// Admission allowlist shared by adapter implementations:
/// empty allowlist admits everyone, otherwise only listed senders are admitted.
#[derive(Clone, Debug, Default)]
pub struct Allowlist(HashSet<String>);

impl Allowlist {
    pub fn new(senders: impl IntoIterator<Item = String>) -> Self {
        Self(senders.into_iter().collect())
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.0.is_empty() || self.0.contains(sender_id)
    }
}

/// Per-chat FIFO of "typing" tokens with per-token TTL; expired tokens are pruned on
/// insertion, and `clear_one` consumes the oldest live token.
pub struct TypingIndicator {
    ttl: Duration,
    tokens: Mutex<HashMap<String, VecDeque<(String, Instant)>>>,
}

impl TypingIndicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn prune(&self, queue: &mut VecDeque<(String, Instant)>) {
        let ttl = self.ttl;
        queue.retain(|(_, inserted)| inserted.elapsed() < ttl);
    }

    pub fn insert(&self, chat_id: &str, token: impl Into<String>) {
        let mut tokens = self.tokens.lock().expect("typing indicator poisoned");
        let queue = tokens.entry(chat_id.to_string()).or_default();
        self.prune(queue);
        queue.push_back((token.into(), Instant::now()));
    }

    /// Pops and returns the oldest live token for `chat_id`, or `None` if the FIFO
    /// is empty or every token has expired.
    pub fn clear_one(&self, chat_id: &str) -> Option<String> {
        let mut tokens = self.tokens.lock().expect("typing indicator poisoned");
        let queue = tokens.get_mut(chat_id)?;
        self.prune(queue);
        queue.pop_front().map(|(token, _)| token)
    }
}

/// One account's credentials within a multi-account channel config.
#[derive(Clone, Debug, Default)]
pub struct AccountCredentials {
    pub enabled: bool,
    pub credentials: HashMap<String, String>,
}

fn has_required(credentials: &HashMap<String, String>, required: &[&str]) -> bool {
    required.iter().all(|key| {
        credentials
            .get(*key)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    })
}

/// Resolves which credential set a channel should use:
/// prefer top-level credentials; else the first *declared* enabled account with the
/// required keys; else the lexicographically first account with the required keys
/// regardless of `enabled`; else empty.
pub fn resolve_credentials(
    top_level: &HashMap<String, String>,
    required: &[&str],
    accounts: &[(String, AccountCredentials)],
) -> HashMap<String, String> {
    if has_required(top_level, required) {
        return top_level.clone();
    }
    if let Some((_, account)) = accounts
        .iter()
        .find(|(_, a)| a.enabled && has_required(&a.credentials, required))
    {
        return account.credentials.clone();
    }
    let mut by_name: Vec<&(String, AccountCredentials)> = accounts
        .iter()
        .filter(|(_, a)| has_required(&a.credentials, required))
        .collect();
    by_name.sort_by(|a, b| a.0.cmp(&b.0));
    by_name
        .first()
        .map(|(_, a)| a.credentials.clone())
        .unwrap_or_default()
}

/// Adapters keyed by `(channel, accountId)`.
#[derive(Default)]
pub struct ChannelRegistry {
    adapters: Mutex<HashMap<(String, String), Arc<dyn ChannelAdapter>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let key = (adapter.name().to_string(), adapter.account_id().to_string());
        self.adapters.lock().expect("channel registry poisoned").insert(key, adapter);
    }

    pub fn get(&self, channel: &str, account_id: Option<&str>) -> Option<Arc<dyn ChannelAdapter>> {
        let adapters = self.adapters.lock().expect("channel registry poisoned");
        if let Some(account_id) = account_id {
            return adapters.get(&(channel.to_string(), account_id.to_string())).cloned();
        }
        // No account specified: route to the sole adapter registered for `channel`.
        let mut matches = adapters.iter().filter(|((c, _), _)| c == channel);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.1.clone())
    }

    pub fn list(&self) -> Vec<(String, String)> {
        self.adapters.lock().expect("channel registry poisoned").keys().cloned().collect()
    }
}

/// Subscribes to the bus's `outbound` topic and routes each message to its
/// adapter. Failed deliveries are logged, not retried; retry policy lives with
/// the producer.
pub struct OutboundDispatcher {
    bus: Arc<MessageBus>,
    registry: Arc<ChannelRegistry>,
}

impl OutboundDispatcher {
    pub fn new(bus: Arc<MessageBus>, registry: Arc<ChannelRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Runs the dispatch loop until the bus subscription closes or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut subscription = self.bus.subscribe(Topic::Outbound);
        loop {
            let event = tokio::select! {
                event = subscription.recv() => event,
                _ = cancel.cancelled() => return,
            };
            let Some(BusEvent::Outbound(message)) = event else {
                return;
            };
            match self.registry.get(&message.channel, message.account_id.as_deref()) {
                Some(adapter) => {
                    if let Err(err) = adapter.send(&message).await {
                        tracing::warn!(channel = %message.channel, error = %err, "outbound delivery failed");
                    }
                }
                None => {
                    tracing::warn!(channel = %message.channel, account_id = ?message.account_id, "no adapter for outbound message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_admits_everyone_when_empty() {
        let allow = Allowlist::default();
        assert!(allow.is_allowed("anyone"));
    }

    #[test]
    fn allowlist_admits_only_listed_senders() {
        let allow = Allowlist::new(["u1".to_string()]);
        assert!(allow.is_allowed("u1"));
        assert!(!allow.is_allowed("u2"));
    }

    #[test]
    fn typing_indicator_clears_oldest_token_first() {
        let indicator = TypingIndicator::new(Duration::from_secs(60));
        indicator.insert("c1", "t1");
        indicator.insert("c1", "t2");
        assert_eq!(indicator.clear_one("c1"), Some("t1".to_string()));
        assert_eq!(indicator.clear_one("c1"), Some("t2".to_string()));
        assert_eq!(indicator.clear_one("c1"), None);
    }

    #[test]
    fn typing_indicator_prunes_expired_tokens_on_insert() {
        let indicator = TypingIndicator::new(Duration::from_millis(1));
        indicator.insert("c1", "stale");
        std::thread::sleep(Duration::from_millis(5));
        indicator.insert("c1", "fresh");
        assert_eq!(indicator.clear_one("c1"), Some("fresh".to_string()));
    }

    fn creds(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn resolve_credentials_prefers_top_level() {
        let top = creds(&[("token", "top-secret")]);
        let resolved = resolve_credentials(&top, &["token"], &[]);
        assert_eq!(resolved.get("token"), Some(&"top-secret".to_string()));
    }

    #[test]
    fn resolve_credentials_falls_back_to_first_enabled_account_in_declared_order() {
        let top = HashMap::new();
        let accounts = vec![
            (
                "b".to_string(),
                AccountCredentials {
                    enabled: true,
                    credentials: creds(&[("token", "b-secret")]),
                },
            ),
            (
                "a".to_string(),
                AccountCredentials {
                    enabled: true,
                    credentials: creds(&[("token", "a-secret")]),
                },
            ),
        ];
        let resolved = resolve_credentials(&top, &["token"], &accounts);
        assert_eq!(resolved.get("token"), Some(&"b-secret".to_string()));
    }

    #[test]
    fn resolve_credentials_falls_back_to_lexicographically_first_when_none_enabled() {
        let top = HashMap::new();
        let accounts = vec![
            (
                "zeta".to_string(),
                AccountCredentials {
                    enabled: false,
                    credentials: creds(&[("token", "z-secret")]),
                },
            ),
            (
                "alpha".to_string(),
                AccountCredentials {
                    enabled: false,
                    credentials: creds(&[("token", "a-secret")]),
                },
            ),
        ];
        let resolved = resolve_credentials(&top, &["token"], &accounts);
        assert_eq!(resolved.get("token"), Some(&"a-secret".to_string()));
    }

    #[test]
    fn resolve_credentials_returns_empty_when_nothing_qualifies() {
        let top = HashMap::new();
        let accounts = vec![(
            "a".to_string(),
            AccountCredentials {
                enabled: true,
                credentials: HashMap::new(),
            },
        )];
        let resolved = resolve_credentials(&top, &["token"], &accounts);
        assert!(resolved.is_empty());
    }

    struct RecordingAdapter {
        channel: String,
        account: String,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn name(&self) -> &str {
            &self.channel
        }
        fn account_id(&self) -> &str {
            &self.account
        }
        async fn start(&self, _cancel: CancellationToken) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.id.clone());
            Ok(())
        }
        fn is_allowed(&self, _sender_id: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_by_channel_and_account() {
        let bus = Arc::new(MessageBus::new(10));
        let registry = Arc::new(ChannelRegistry::new());
        let sent = Arc::new(Mutex::new(Vec::new()));
        registry.register(Arc::new(RecordingAdapter {
            channel: "telegram".into(),
            account: "acct1".into(),
            sent: sent.clone(),
        }));

        let dispatcher = OutboundDispatcher::new(bus.clone(), registry);
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move { dispatcher.run(cancel_for_task).await });

        bus.publish(
            Topic::Outbound,
            BusEvent::Outbound(OutboundMessage {
                id: "m1".into(),
                channel: "telegram".into(),
                account_id: Some("acct1".into()),
                chat_id: "c1".into(),
                content: "hi".into(),
                media: Vec::new(),
                reply_to: None,
                is_stream: false,
                chat_state: None,
                timestamp: chrono::Utc::now(),
            }),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let _ = task.await;
        assert_eq!(*sent.lock().unwrap(), vec!["m1".to_string()]);
    }
}
