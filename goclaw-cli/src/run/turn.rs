//! The agent turn runner: consumes inbound bus messages, owns one turn per
//! message on the `main` lane, and publishes stream telemetry plus the final
//! outbound reply.

use std::sync::Arc;

use goclaw_core::bus::{AgentEvent, BusEvent, InboundMessage, MessageBus, OutboundMessage, Topic};
use goclaw_core::lanes::{self, EnqueueOptions, LaneScheduler};
use goclaw_core::session::{session_key, Message, SessionScope};
use goclaw_core::{classify, ChatProvider, SessionManager};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub struct TurnDeps {
    pub bus: Arc<MessageBus>,
    pub sessions: Arc<SessionManager>,
    pub lanes: Arc<LaneScheduler>,
    pub provider: Arc<dyn ChatProvider>,
    pub agent_id: String,
}

/// Subscribes to the inbound topic and hands each message to the `main` lane.
/// The subscription loop itself never waits on a turn; ordering within a
/// session is the lane's job.
pub fn spawn_turn_runner(deps: TurnDeps, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let deps = Arc::new(deps);
    tokio::spawn(async move {
        let mut inbound = deps.bus.subscribe(Topic::Inbound);
        loop {
            let event = tokio::select! {
                event = inbound.recv() => event,
                _ = cancel.cancelled() => return,
            };
            let Some(BusEvent::Inbound(message)) = event else { return };

            let deps = deps.clone();
            let turn_cancel = cancel.clone();
            tokio::spawn(async move {
                let lanes = deps.lanes.clone();
                let result = lanes
                    .enqueue(lanes::MAIN, EnqueueOptions::default(), move || async move {
                        run_turn(&deps, message, &turn_cancel).await
                    })
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "turn task was dropped by the lane");
                }
            });
        }
    })
}

fn derive_key(agent_id: &str, message: &InboundMessage) -> String {
    let is_group = message
        .metadata
        .get("is_group")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let scope = if is_group {
        SessionScope::Group {
            channel: message.channel.clone(),
            account_id: Some(message.account_id.clone()),
            chat_id: message.chat_id.clone(),
        }
    } else {
        SessionScope::Direct
    };
    let thread_id = message.metadata.get("thread_id").and_then(|v| v.as_str());
    session_key(agent_id, &scope, thread_id)
}

async fn run_turn(deps: &Arc<TurnDeps>, message: InboundMessage, cancel: &CancellationToken) {
    let key = derive_key(&deps.agent_id, &message);
    info!(session_key = %key, channel = %message.channel, "agent turn started");
    deps.bus.publish(
        Topic::AgentEvent,
        BusEvent::Agent(AgentEvent::Lifecycle { session_key: key.clone(), phase: "started".into() }),
    );
    // Let the originating chat show a typing indicator while the model runs.
    deps.bus.publish(
        Topic::Outbound,
        BusEvent::Outbound(OutboundMessage {
            id: Uuid::new_v4().to_string(),
            channel: message.channel.clone(),
            account_id: Some(message.account_id.clone()),
            chat_id: message.chat_id.clone(),
            content: String::new(),
            media: Vec::new(),
            reply_to: None,
            is_stream: true,
            chat_state: Some("typing".into()),
            timestamp: chrono::Utc::now(),
        }),
    );

    let session = match deps.sessions.get_or_create(&key).await {
        Ok(session) => session,
        Err(e) => {
            warn!(session_key = %key, error = %e, "failed to open session");
            return;
        }
    };

    let history = {
        let mut guard = session.lock().await;
        let mut user = Message::user(message.content.clone());
        user.media = message.media.clone();
        guard.add_message(user);
        guard.messages.clone()
    };

    // Forward stream deltas as agent events while the call runs.
    let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::channel::<String>(16);
    let stream_bus = deps.bus.clone();
    let stream_key = key.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(delta) = chunk_rx.recv().await {
            stream_bus.publish(
                Topic::AgentEvent,
                BusEvent::Agent(AgentEvent::Assistant { session_key: stream_key.clone(), delta, done: false }),
            );
        }
    });

    let result = deps.provider.call_stream(&history, cancel, Some(chunk_tx)).await;
    let _ = forwarder.await;

    match result {
        Ok(response) => {
            deps.bus.publish(
                Topic::AgentEvent,
                BusEvent::Agent(AgentEvent::Assistant {
                    session_key: key.clone(),
                    delta: String::new(),
                    done: true,
                }),
            );

            {
                let mut guard = session.lock().await;
                let mut assistant = Message::assistant(response.content.clone());
                assistant.tool_calls = response.tool_calls.clone();
                guard.add_message(assistant);
                if let Err(e) = deps.sessions.save(&guard).await {
                    warn!(session_key = %key, error = %e, "failed to persist session");
                }
            }

            deps.bus.publish(
                Topic::Outbound,
                BusEvent::Outbound(OutboundMessage {
                    id: Uuid::new_v4().to_string(),
                    channel: message.channel.clone(),
                    account_id: Some(message.account_id.clone()),
                    chat_id: message.chat_id.clone(),
                    content: response.content,
                    media: Vec::new(),
                    reply_to: Some(message.id.clone()),
                    is_stream: false,
                    chat_state: None,
                    timestamp: chrono::Utc::now(),
                }),
            );
            deps.bus.publish(
                Topic::AgentEvent,
                BusEvent::Agent(AgentEvent::Lifecycle { session_key: key.clone(), phase: "finished".into() }),
            );
            info!(session_key = %key, "agent turn finished");
        }
        Err(e) => {
            let reason = classify(&e.0);
            warn!(session_key = %key, reason = %reason, error = %e, "agent turn failed");
            deps.bus.publish(
                Topic::AgentEvent,
                BusEvent::Agent(AgentEvent::Error {
                    session_key: key.clone(),
                    reason: reason.to_string(),
                    message: e.0,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goclaw_core::provider::MockProvider;
    use std::time::Duration;

    fn inbound(chat_id: &str, content: &str, is_group: bool) -> InboundMessage {
        let mut metadata = serde_json::Map::new();
        metadata.insert("is_group".to_string(), serde_json::json!(is_group));
        InboundMessage {
            id: Uuid::new_v4().to_string(),
            channel: "telegram".into(),
            account_id: "1".into(),
            sender_id: "7".into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn group_messages_key_on_channel_account_and_chat() {
        let key = derive_key("main", &inbound("42", "hi", true));
        assert_eq!(key, "agent:main:telegram:1:group:42");
    }

    #[test]
    fn direct_messages_collapse_to_the_main_key() {
        let key = derive_key("main", &inbound("42", "hi", false));
        assert_eq!(key, "agent:main:main");
    }

    #[tokio::test]
    async fn a_turn_appends_user_and_assistant_then_publishes_outbound() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MessageBus::default());
        let deps = Arc::new(TurnDeps {
            bus: bus.clone(),
            sessions: Arc::new(SessionManager::new(dir.path())),
            lanes: Arc::new(LaneScheduler::new()),
            provider: Arc::new(MockProvider::ok("pong")),
            agent_id: "main".to_string(),
        });
        let mut outbound = bus.subscribe(Topic::Outbound);

        run_turn(&deps, inbound("42", "ping", true), &CancellationToken::new()).await;

        // First outbound is the typing fragment, then the final reply.
        let mut final_reply = None;
        for _ in 0..2 {
            match tokio::time::timeout(Duration::from_secs(2), outbound.recv()).await.unwrap() {
                Some(BusEvent::Outbound(m)) if !m.is_stream => final_reply = Some(m),
                Some(BusEvent::Outbound(_)) => {}
                other => panic!("expected outbound event, got {other:?}"),
            }
        }
        let final_reply = final_reply.expect("no final reply seen");
        assert_eq!(final_reply.content, "pong");

        let session = deps.sessions.get_or_create("agent:main:telegram:1:group:42").await.unwrap();
        let guard = session.lock().await;
        assert_eq!(guard.messages.len(), 2);
    }

    #[tokio::test]
    async fn a_failed_turn_publishes_a_classified_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MessageBus::default());
        let deps = Arc::new(TurnDeps {
            bus: bus.clone(),
            sessions: Arc::new(SessionManager::new(dir.path())),
            lanes: Arc::new(LaneScheduler::new()),
            provider: Arc::new(MockProvider::failing("rate limit exceeded")),
            agent_id: "main".to_string(),
        });
        let mut events = bus.subscribe(Topic::AgentEvent);

        run_turn(&deps, inbound("42", "ping", false), &CancellationToken::new()).await;

        let mut saw_error = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            if let BusEvent::Agent(AgentEvent::Error { reason, .. }) = event {
                assert_eq!(reason, "rate_limit");
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
    }
}
