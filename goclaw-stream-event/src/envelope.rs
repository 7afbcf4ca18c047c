//! Envelope (session_key, event_id) merged into each event before it goes on
//! the wire. One `EnvelopeState` lives per client connection, so `event_id` is
//! monotonically increasing per stream even when events interleave sessions.

use crate::event::ProtocolEvent;
use serde_json::Value;

/// Envelope fields stamped onto each outgoing event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Canonical session key the event belongs to.
    pub session_key: Option<String>,
    /// Per-connection sequence number; monotonically increasing.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref key) = self.session_key {
            obj.entry("session_key")
                .or_insert_with(|| Value::String(key.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Per-connection envelope state: the next event_id to hand out.
pub struct EnvelopeState {
    next_event_id: u64,
}

impl Default for EnvelopeState {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeState {
    pub fn new() -> Self {
        Self { next_event_id: 1 }
    }

    /// Builds the envelope for the next event on this connection and advances
    /// the sequence counter.
    pub fn next(&mut self, session_key: &str) -> Envelope {
        let env = Envelope::new()
            .with_session_key(session_key)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env
    }
}

/// Converts an event to JSON and injects the envelope using the given state.
/// Returns the final value (stream + payload + session_key, event_id).
pub fn to_json(
    event: &ProtocolEvent,
    session_key: &str,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.next(session_key).inject_into(&mut value);
    Ok(value)
}
