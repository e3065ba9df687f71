//! Anthropic Messages API streams: block lifecycle events folded into one
//! `message` object.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::assembly::{assemble, Assembled};
use crate::error::{CoreResult, LlmViewError};
use crate::providers::truthy;
use crate::sse;
use crate::telemetry::{self, AggregationLog};

/// Id and model of the placeholder message returned when no `message_start` arrived.
pub const NOT_AVAILABLE: &str = "N/A";

// ===== Stream events =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: Message,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: Option<usize>,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<UsageDelta>,
    },
    MessageStop,
    /// `ping`, `error` and tags introduced after this was written.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    CitationsDelta { citation: Value },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Usage as carried by `message_delta`: any subset of fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation: Option<Value>,
    #[serde(default)]
    pub server_tool_use: Option<Value>,
    #[serde(default)]
    pub service_tier: Option<String>,
}

// ===== Message and content blocks =====

/// A Messages API response; also the snapshot embedded in `message_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

fn default_message_type() -> String {
    "message".into()
}

fn default_role() -> String {
    "assistant".into()
}

impl Message {
    /// Placeholder for a stream in which no `message_start` was seen.
    pub fn placeholder() -> Self {
        Self {
            id: NOT_AVAILABLE.into(),
            kind: default_message_type(),
            role: default_role(),
            model: NOT_AVAILABLE.into(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation: Option<Value>,
    #[serde(default)]
    pub server_tool_use: Option<Value>,
    #[serde(default)]
    pub service_tier: Option<String>,
}

impl Usage {
    /// Field-wise merge: every field present in `d` replaces ours.
    fn merge(&mut self, d: &UsageDelta) {
        if let Some(v) = d.input_tokens {
            self.input_tokens = v;
        }
        if let Some(v) = d.output_tokens {
            self.output_tokens = v;
        }
        if d.cache_creation_input_tokens.is_some() {
            self.cache_creation_input_tokens = d.cache_creation_input_tokens;
        }
        if d.cache_read_input_tokens.is_some() {
            self.cache_read_input_tokens = d.cache_read_input_tokens;
        }
        if d.cache_creation.is_some() {
            self.cache_creation.clone_from(&d.cache_creation);
        }
        if d.server_tool_use.is_some() {
            self.server_tool_use.clone_from(&d.server_tool_use);
        }
        if d.service_tier.is_some() {
            self.service_tier.clone_from(&d.service_tier);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ServerToolUse(ToolUseBlock),
    Thinking(ThinkingBlock),
    /// Any other block type, kept exactly as received.
    #[serde(untagged)]
    Other(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citations: Vec<Value>,
}

/// A tool invocation. `input` holds the last successfully parsed value of
/// `partial_json`; the buffer itself never leaves the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(skip)]
    partial_json: String,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            partial_json: String::new(),
        }
    }

    /// Raw input text received so far.
    pub fn partial_json(&self) -> &str {
        &self.partial_json
    }

    /// Append a fragment and re-parse the whole buffer. A buffer that does not
    /// parse yet leaves `input` untouched.
    fn push_json(&mut self, fragment: &str) {
        self.partial_json.push_str(fragment);
        if let Ok(v) = serde_json::from_str::<Value>(&self.partial_json) {
            self.input = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub thinking: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub signature: String,
}

/// Blocks sometimes carry explicit nulls (`"citations": null`).
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

impl ContentBlock {
    fn apply(&mut self, delta: &BlockDelta) {
        match (self, delta) {
            (ContentBlock::Text(b), BlockDelta::TextDelta { text }) => b.text.push_str(text),
            (ContentBlock::Text(b), BlockDelta::CitationsDelta { citation }) => {
                b.citations.push(citation.clone())
            }
            (
                ContentBlock::ToolUse(b) | ContentBlock::ServerToolUse(b),
                BlockDelta::InputJsonDelta { partial_json },
            ) => b.push_json(partial_json),
            (ContentBlock::Thinking(b), BlockDelta::ThinkingDelta { thinking }) => {
                b.thinking.push_str(thinking)
            }
            (ContentBlock::Thinking(b), BlockDelta::SignatureDelta { signature }) => {
                b.signature.clone_from(signature)
            }
            // mismatched block/delta pairs and unknown deltas
            _ => {}
        }
    }

    fn type_name(&self) -> &str {
        match self {
            ContentBlock::Text(_) => "text",
            ContentBlock::ToolUse(_) => "tool_use",
            ContentBlock::ServerToolUse(_) => "server_tool_use",
            ContentBlock::Thinking(_) => "thinking",
            ContentBlock::Other(v) => v.get("type").and_then(Value::as_str).unwrap_or("?"),
        }
    }
}

// ===== Aggregation =====

/// Message snapshot being built; blocks keyed by their stream index.
struct Snapshot {
    message: Message,
    blocks: BTreeMap<usize, ContentBlock>,
}

impl Snapshot {
    fn start(mut message: Message) -> Self {
        let blocks = std::mem::take(&mut message.content)
            .into_iter()
            .enumerate()
            .collect();
        Self { message, blocks }
    }

    fn apply(&mut self, ev: &StreamEvent) {
        match ev {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    ContentBlock::Text(t) => ContentBlock::Text(TextBlock {
                        text: t.text.clone(),
                        citations: Vec::new(),
                    }),
                    other => other.clone(),
                };
                self.blocks.insert(*index, block);
            }
            StreamEvent::ContentBlockDelta { index, delta } => match self.blocks.get_mut(index) {
                Some(block) => block.apply(delta),
                None => tracing::debug!(index, "delta for a block that was never started"),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.message.stop_reason.clone_from(&delta.stop_reason);
                }
                if delta.stop_sequence.is_some() {
                    self.message.stop_sequence.clone_from(&delta.stop_sequence);
                }
                if let Some(u) = usage {
                    self.message.usage.merge(u);
                }
            }
            // message_start is handled by the caller
            StreamEvent::MessageStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::MessageStop
            | StreamEvent::Unknown => {}
        }
    }

    fn finish(self) -> Message {
        Message {
            content: self.blocks.into_values().collect(),
            ..self.message
        }
    }
}

/// Fold a complete event sequence into one message.
///
/// Events before the first `message_start` are dropped; a stream without one
/// yields [`Message::placeholder`]. A later `message_start` restarts the snapshot.
pub fn aggregate(events: &[StreamEvent]) -> CoreResult<Assembled<Message>> {
    if events.is_empty() {
        return Err(LlmViewError::EmptyInput);
    }
    let span = tracing::debug_span!("aggregate", llm.provider = "anthropic", stream.events = events.len());
    let _enter = span.enter();

    let mut snapshot: Option<Snapshot> = None;
    for ev in events {
        if let StreamEvent::MessageStart { message } = ev {
            snapshot = Some(Snapshot::start(message.clone()));
        } else if let Some(s) = snapshot.as_mut() {
            s.apply(ev);
        }
    }

    let message = match snapshot {
        Some(s) => s.finish(),
        None => {
            tracing::debug!("stream had no message_start; returning placeholder");
            Message::placeholder()
        }
    };
    tracing::debug!(
        blocks = message.content.len(),
        kinds = ?message.content.iter().map(ContentBlock::type_name).collect::<Vec<_>>(),
        "aggregated message stream"
    );

    let u = &message.usage;
    telemetry::emit(
        AggregationLog::new("anthropic")
            .model(&message.model)
            .response_id(&message.id)
            .counts(events.len(), message.content.len())
            .finish_reason_opt(message.stop_reason.as_deref())
            .tokens(
                Some(u.input_tokens),
                Some(u.output_tokens),
                u.input_tokens.checked_add(u.output_tokens),
            ),
    );

    Ok(assemble(message, events.len()))
}

/// Shape check for bare (marker-less) event lines.
pub fn looks_like_event(v: &Value) -> bool {
    v.get("type").is_some_and(Value::is_string)
}

/// Parse a raw SSE body into typed events.
pub fn parse_stream(text: &str) -> Vec<StreamEvent> {
    sse::decode_events(sse::parse_events(text, looks_like_event))
}

/// A Messages API request body (`model` plus `messages` or `prompt`).
pub fn is_request(v: &Value) -> bool {
    truthy(v.get("model")) && (truthy(v.get("messages")) || truthy(v.get("prompt")))
}

/// A non-streamed Messages API response (`content` plus `model`).
pub fn is_response(v: &Value) -> bool {
    truthy(v.get("content")) && truthy(v.get("model"))
}
