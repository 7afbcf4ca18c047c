//! OpenAI Chat Completions implementation of [`ChatProvider`].
//!
//! Works against api.openai.com or any OpenAI-compatible endpoint (set a
//! custom base URL on the config). Requires an API key, either from
//! `OPENAI_API_KEY` or an explicit [`OpenAIConfig`].
//!
//! # Streaming
//!
//! `call_stream` uses the Chat Completions streaming API and forwards each
//! content delta through the provided channel as it arrives. Tool-call deltas
//! are accumulated by index and returned on the final [`ChatResponse`]. Some
//! proxies send content only in the final payload rather than as deltas; in
//! that case the full content is sent as one chunk at the end so the stream
//! still carries assistant text.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::provider::{ChatProvider, ChatResponse, ChatUsage, ProviderCallError};
use crate::session::{Message, MessageRole, ToolCall};

pub struct OpenAIChatProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIChatProvider {
    /// Builds a client with default config (API key from `OPENAI_API_KEY`).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Builds a client with custom config (different key or base URL, e.g. an
    /// OpenAI-compatible provider).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Converts session messages to request messages. Assistant history is
    /// sent as text; tool results carry their `tool_call_id` through.
    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                MessageRole::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(m.content.as_str()),
                ),
                MessageRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(m.content.as_str()),
                ),
                MessageRole::Assistant => {
                    ChatCompletionRequestMessage::Assistant((m.content.as_str()).into())
                }
                MessageRole::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                    content: ChatCompletionRequestToolMessageContent::Text(m.content.clone()),
                    tool_call_id: m.tool_call_id.clone().unwrap_or_default(),
                }),
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, ProviderCallError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if stream {
            args.stream(true);
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        args.build()
            .map_err(|e| ProviderCallError::new(format!("openai request build failed: {e}")))
    }
}

/// Tool-call arguments arrive as a JSON string; keep them structured when they
/// parse, raw otherwise.
fn parse_arguments(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ProviderCallError> {
        let request = self.build_request(messages, false)?;
        debug!(model = %self.model, message_count = messages.len(), "openai chat create");

        let chat = self.client.chat();
        let response = tokio::select! {
            r = chat.create(request) => {
                r.map_err(|e| ProviderCallError::new(format!("openai: {e}")))?
            }
            _ = cancel.cancelled() => return Err(ProviderCallError::new("cancelled")),
        };

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderCallError::new("openai returned no choices"))?;

        let message = choice.message;
        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(ToolCall {
                    id: f.id,
                    name: f.function.name,
                    arguments: parse_arguments(f.function.arguments),
                }),
                _ => None,
            })
            .collect();

        Ok(ChatResponse {
            content: message.content.unwrap_or_default(),
            tool_calls,
            usage: response.usage.map(|u| ChatUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn call_stream(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<ChatResponse, ProviderCallError> {
        let Some(chunk_tx) = chunk_tx else {
            return self.call(messages, cancel).await;
        };

        let request = self.build_request(messages, true)?;
        debug!(model = %self.model, message_count = messages.len(), "openai chat create_stream");

        let chat = self.client.chat();
        let mut stream = tokio::select! {
            r = chat.create_stream(request) => {
                r.map_err(|e| ProviderCallError::new(format!("openai stream: {e}")))?
            }
            _ = cancel.cancelled() => return Err(ProviderCallError::new("cancelled")),
        };

        let mut full_content = String::new();
        let mut sent_any = false;
        // index -> (id, name, arguments) accumulated across deltas
        let mut tool_call_map: std::collections::HashMap<u32, (String, String, String)> =
            std::collections::HashMap::new();
        let mut usage: Option<ChatUsage> = None;

        loop {
            let next = tokio::select! {
                n = stream.next() => n,
                _ = cancel.cancelled() => return Err(ProviderCallError::new("cancelled")),
            };
            let Some(result) = next else { break };
            let response = result.map_err(|e| ProviderCallError::new(format!("openai stream: {e}")))?;

            if let Some(ref u) = response.usage {
                usage = Some(ChatUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                });
            }

            for choice in response.choices {
                let delta = &choice.delta;
                if let Some(ref content) = delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        sent_any = true;
                        let _ = chunk_tx.send(content.clone()).await;
                    }
                }
                if let Some(ref tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map
                            .entry(tc.index)
                            .or_insert_with(|| (tc.id.clone().unwrap_or_default(), String::new(), String::new()));
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(ref func) = tc.function {
                            if let Some(ref name) = func.name {
                                entry.1.push_str(name);
                            }
                            if let Some(ref args) = func.arguments {
                                entry.2.push_str(args);
                            }
                        }
                    }
                }
            }
        }

        if !sent_any && !full_content.is_empty() {
            let _ = chunk_tx.send(full_content.clone()).await;
        }

        let mut tool_calls: Vec<ToolCall> = tool_call_map
            .into_values()
            .map(|(id, name, arguments)| ToolCall {
                id,
                name,
                arguments: parse_arguments(arguments),
            })
            .collect();
        tool_calls.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ChatResponse {
            content: full_content,
            tool_calls,
            usage,
        })
    }
}
