//! Provider rotation, failover, and concurrency limiting.
//!
//! [`ChatProvider`] is a bare chat-completion call; [`ProviderRotation`] is
//! itself a `ChatProvider` so the concurrency-limit and retry wrappers compose
//! transparently around it. [`OpenAIChatProvider`] is the concrete
//! OpenAI-compatible implementation the CLI wires profiles onto.

mod openai;

pub use async_openai::config::OpenAIConfig;
pub use openai::OpenAIChatProvider;

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::classify::{classify, extract_retry_after, is_retryable, Reason};
use crate::retry::RetryConfig;
use crate::session::Message;

/// Raw error text from a provider call, classified by [`crate::classify`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ProviderCallError(pub String);

impl ProviderCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<crate::session::ToolCall>,
    pub usage: Option<ChatUsage>,
}

/// A single chat-completion call against one concrete backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError>;

    /// Streaming variant; the default implementation runs the non-streaming
    /// call and sends the full content as one chunk.
    async fn call_stream(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<ChatResponse, ProviderCallError> {
        let response = self.call(messages, cancel).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx.send(response.content.clone()).await;
            }
        }
        Ok(response)
    }
}

/// Fixed-response test double so rotation/retry tests never touch the network.
pub struct MockProvider {
    pub content: String,
    pub fail_with: Option<String>,
}

impl MockProvider {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            fail_with: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn call(
        &self,
        _messages: &[Message],
        _cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError> {
        match &self.fail_with {
            Some(message) => Err(ProviderCallError::new(message.clone())),
            None => Ok(ChatResponse {
                content: self.content.clone(),
                tool_calls: Vec::new(),
                usage: None,
            }),
        }
    }
}

/// Per-profile lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderState {
    Active,
    Cooling,
    Broken,
}

/// Ordering strategy among eligible (non-cooling, non-broken) profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    RoundRobin,
    LeastUsed,
    Random,
}

struct Profile {
    name: String,
    provider: Arc<dyn ChatProvider>,
    priority: i32,
    insertion_order: usize,
    state: Mutex<ProviderState>,
    cooldown_until: Mutex<Option<Instant>>,
    broken_since: Mutex<Option<Instant>>,
    failure_streak: AtomicU32,
    calls_in_flight: AtomicU32,
    calls_total: AtomicU64,
}

#[derive(Clone, Copy, Debug)]
pub struct RotationConfig {
    pub strategy: SelectionStrategy,
    /// Consecutive failures before a profile moves to `broken`.
    pub failure_threshold: u32,
    /// How long a `broken` profile stays broken before being retried.
    pub broken_timeout: Duration,
    pub default_cooldown: Duration,
    pub max_cooldown: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::RoundRobin,
            failure_threshold: 5,
            broken_timeout: Duration::from_secs(300),
            default_cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// Ring of provider profiles with rotation, failover, and rate-limit cooldowns
///. Implements [`ChatProvider`] itself so the concurrency-limit and
/// retry wrappers compose transparently around it.
pub struct ProviderRotation {
    profiles: RwLock<Vec<Arc<Profile>>>,
    config: RotationConfig,
    round_robin_cursor: AtomicUsize,
}

impl ProviderRotation {
    pub fn new(config: RotationConfig) -> Self {
        Self {
            profiles: RwLock::new(Vec::new()),
            config,
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    pub async fn add_profile(&self, name: impl Into<String>, provider: Arc<dyn ChatProvider>, priority: i32) {
        let mut profiles = self.profiles.write().await;
        let insertion_order = profiles.len();
        profiles.push(Arc::new(Profile {
            name: name.into(),
            provider,
            priority,
            insertion_order,
            state: Mutex::new(ProviderState::Active),
            cooldown_until: Mutex::new(None),
            broken_since: Mutex::new(None),
            failure_streak: AtomicU32::new(0),
            calls_in_flight: AtomicU32::new(0),
            calls_total: AtomicU64::new(0),
        }));
    }

    /// Snapshot of `(name, state)` for every registered profile, for a status endpoint.
    pub async fn profile_states(&self) -> Vec<(String, ProviderState)> {
        let profiles = self.profiles.read().await;
        let mut out = Vec::with_capacity(profiles.len());
        for profile in profiles.iter() {
            out.push((profile.name.clone(), *profile.state.lock().await));
        }
        out
    }

    /// Applies pending `cooling -> active` / `broken -> active` transitions, then
    /// returns the profiles currently eligible for selection, ordered by
    /// `(priority asc, insertion asc)`.
    async fn refresh_eligible(&self, profiles: &[Arc<Profile>]) -> Vec<Arc<Profile>> {
        let now = Instant::now();
        let mut eligible = Vec::new();
        for profile in profiles {
            let mut state = profile.state.lock().await;
            match *state {
                ProviderState::Cooling => {
                    let elapsed = profile
                        .cooldown_until
                        .lock()
                        .await
                        .map(|until| now >= until)
                        .unwrap_or(true);
                    if elapsed {
                        *state = ProviderState::Active;
                    }
                }
                ProviderState::Broken => {
                    let elapsed = profile
                        .broken_since
                        .lock()
                        .await
                        .map(|since| now.duration_since(since) >= self.config.broken_timeout)
                        .unwrap_or(true);
                    if elapsed {
                        *state = ProviderState::Active;
                        profile.failure_streak.store(0, Ordering::SeqCst);
                    }
                }
                ProviderState::Active => {}
            }
            if *state == ProviderState::Active {
                eligible.push(profile.clone());
            }
        }
        eligible.sort_by_key(|p| (p.priority, p.insertion_order));
        eligible
    }

    fn select<'a>(&self, eligible: &'a [Arc<Profile>]) -> Option<&'a Arc<Profile>> {
        if eligible.is_empty() {
            return None;
        }
        match self.config.strategy {
            SelectionStrategy::RoundRobin => {
                let cursor = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst);
                eligible.get(cursor % eligible.len())
            }
            SelectionStrategy::LeastUsed => eligible.iter().min_by_key(|p| {
                let usage = p.calls_in_flight.load(Ordering::SeqCst) as u64
                    + p.calls_total.load(Ordering::SeqCst);
                (usage, p.priority, p.insertion_order)
            }),
            SelectionStrategy::Random => {
                use rand::Rng;
                let idx = rand::thread_rng().gen_range(0..eligible.len());
                eligible.get(idx)
            }
        }
    }

    async fn record_success(&self, profile: &Profile) {
        profile.failure_streak.store(0, Ordering::SeqCst);
        profile.calls_total.fetch_add(1, Ordering::SeqCst);
        *profile.state.lock().await = ProviderState::Active;
    }

    async fn record_failure(&self, profile: &Profile, reason: Reason, err_text: &str) {
        profile.calls_total.fetch_add(1, Ordering::SeqCst);
        if matches!(reason, Reason::Auth | Reason::Billing) {
            *profile.state.lock().await = ProviderState::Broken;
            *profile.broken_since.lock().await = Some(Instant::now());
            return;
        }
        let streak = profile.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.config.failure_threshold {
            *profile.state.lock().await = ProviderState::Broken;
            *profile.broken_since.lock().await = Some(Instant::now());
        } else if is_retryable(reason) {
            *profile.state.lock().await = ProviderState::Cooling;
            let cooldown = if reason == Reason::RateLimit {
                Duration::from_secs(extract_retry_after(
                    err_text,
                    self.config.default_cooldown.as_secs(),
                    self.config.max_cooldown.as_secs(),
                ))
            } else {
                self.config.default_cooldown
            };
            *profile.cooldown_until.lock().await = Some(Instant::now() + cooldown);
        }
    }
}

#[async_trait]
impl ChatProvider for ProviderRotation {
    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError> {
        let all_profiles = self.profiles.read().await.clone();
        let mut tried: Vec<usize> = Vec::new();
        let mut last_err: Option<ProviderCallError> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderCallError::new("cancelled"));
            }
            let eligible = self.refresh_eligible(&all_profiles).await;
            let remaining: Vec<Arc<Profile>> = eligible
                .into_iter()
                .filter(|p| !tried.contains(&p.insertion_order))
                .collect();
            let Some(profile) = self.select(&remaining) else {
                return Err(last_err.unwrap_or_else(|| ProviderCallError::new("no eligible providers")));
            };

            profile.calls_in_flight.fetch_add(1, Ordering::SeqCst);
            let result = profile.provider.call(messages, cancel).await;
            profile.calls_in_flight.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(response) => {
                    self.record_success(profile).await;
                    return Ok(response);
                }
                Err(err) => {
                    let reason = classify(&err.0);
                    self.record_failure(profile, reason, &err.0).await;
                    tried.push(profile.insertion_order);
                    last_err = Some(err);
                    if !is_retryable(reason) {
                        return Err(last_err.expect("just set"));
                    }
                }
            }
        }
    }
}

/// Semaphore-bounded wrapper; `max_concurrent = 0`
/// means unbounded. Acquire is cancellation-aware: losing the race to `cancel`
/// returns without invoking the inner provider.
pub struct ConcurrencyLimitedProvider<P> {
    inner: P,
    semaphore: Option<Arc<Semaphore>>,
}

impl<P: ChatProvider> ConcurrencyLimitedProvider<P> {
    pub fn new(inner: P, max_concurrent: usize) -> Self {
        let semaphore = if max_concurrent == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(max_concurrent)))
        };
        Self { inner, semaphore }
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for ConcurrencyLimitedProvider<P> {
    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError> {
        let _permit = match &self.semaphore {
            Some(sem) => {
                tokio::select! {
                    permit = sem.acquire() => Some(permit.expect("semaphore not closed")),
                    _ = cancel.cancelled() => return Err(ProviderCallError::new("cancelled")),
                }
            }
            None => None,
        };
        self.inner.call(messages, cancel).await
    }
}

/// Exponential-backoff retry wrapper composing [`crate::retry`]'s classification
/// rules around an inner provider.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: ChatProvider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for RetryingProvider<P> {
    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ProviderCallError::new("cancelled"));
            }
            match self.inner.call(messages, cancel).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let reason = classify(&err.0);
                    if !is_retryable(reason) || attempt == self.config.max_retries {
                        return Err(err);
                    }
                    let delay = self.config.delay_for(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(ProviderCallError::new("cancelled")),
                    }
                    attempt += 1;
                }
            }
        }
    }
}
