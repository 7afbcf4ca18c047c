//! Agent stream event protocol: stream tag + payload + envelope.
//!
//! This crate defines the wire shape of a single agent-turn event as pushed to
//! control-plane clients, and the envelope injected into each one. It does not
//! depend on goclaw-core; the gateway bridges bus events into `ProtocolEvent`
//! and calls `to_json`.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
