//! # goclaw-core
//!
//! Core runtime for a multi-channel conversational agent service: session
//! journals, a bounded in-process message bus, a multi-lane work scheduler,
//! LLM provider rotation with retry/failover, a SQLite-backed memory search
//! engine, and hot-reloadable configuration.
//!
//! ## Main modules
//!
//! - [`classify`]: error taxonomy classifier ([`classify::Reason`], [`classify::classify`]).
//! - [`retry`]: exponential-backoff retry ([`retry::RetryConfig`], [`retry::retry`]).
//! - [`session`]: per-sender journals ([`session::SessionManager`], [`session::Session`]).
//! - [`lanes`]: bounded-concurrency FIFO lanes ([`lanes::LaneScheduler`]).
//! - [`bus`]: bounded pub/sub fabric ([`bus::MessageBus`], [`bus::BusEvent`]).
//! - [`channels`]: channel adapter contract ([`channels::ChannelAdapter`], [`channels::ChannelRegistry`]).
//! - [`provider`]: provider rotation/failover/concurrency-limit ([`provider::ProviderRotation`]).
//! - [`memory`]: vector + FTS memory store with embedding cache and atomic reindex ([`memory::MemoryManager`]).
//! - [`config`]: layered config loader, watcher, and history ([`config::Config`], [`config::ConfigRuntime`]).
//! - [`error`]: crate-wide [`error::RuntimeError`] taxonomy used by the gateway and CLI.

pub mod bus;
pub mod channels;
pub mod classify;
pub mod config;
pub mod error;
pub mod lanes;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod session;

pub use bus::{BusEvent, MessageBus, Topic};
pub use channels::{ChannelAdapter, ChannelError, ChannelRegistry};
pub use classify::{classify, extract_retry_after, is_retryable, Reason};
pub use config::{Config, ConfigError, ConfigLoader, ConfigRuntime};
pub use error::RuntimeError;
pub use lanes::{LaneError, LaneScheduler, LaneStatus};
pub use memory::{Embedder, MemoryManager, SqliteMemoryStore, VectorStore};
pub use provider::{ChatProvider, OpenAIChatProvider, ProviderRotation, ProviderState};
pub use retry::{retry, retry_with_result, RetryConfig};
pub use session::{Message, MessageRole, Session, SessionManager};
