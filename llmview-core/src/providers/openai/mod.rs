//! OpenAI-style chat completion streams: `chat.completion.chunk` events keyed
//! by choice index, folded into one completion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assembly::{assemble, Assembled};
use crate::error::{CoreResult, LlmViewError};
use crate::providers::truthy;
use crate::sse;
use crate::telemetry::{self, AggregationLog};

/// Placeholder for envelope fields no event supplied.
pub const NOT_AVAILABLE: &str = "N/A";
/// Finish reason of a choice that never received one.
pub const UNKNOWN_FINISH: &str = "unknown";

// ---- Wire types (stream chunks) ----

/// One streamed chunk. Every field is optional; most chunks carry only a
/// choice delta, and usage usually arrives alone near the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<ChoiceDelta>>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    /// Missing on some compatible servers; treated as choice 0.
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    #[serde(default)]
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Token usage snapshot. Cumulative upstream, so it is replaced, never summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Provider extensions (`completion_tokens_details`, cost fields, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

// ---- Aggregated output ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<AggregatedChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedChoice {
    pub index: u32,
    pub role: Option<String>,
    pub content: String,
    pub reasoning_content: String,
    pub tool_calls: Vec<AggregatedToolCall>,
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedToolCall {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub function: AggregatedFunction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFunction {
    pub name: String,
    /// Raw concatenated argument text; parsing is left to the consumer.
    pub arguments: String,
}

// ---- Accumulators ----

/// Latest non-null envelope fields seen so far.
#[derive(Default)]
struct Envelope {
    id: Option<String>,
    object: Option<String>,
    created: Option<i64>,
    model: Option<String>,
    system_fingerprint: Option<String>,
    usage: Option<Usage>,
}

impl Envelope {
    fn absorb(&mut self, ev: &ChunkEvent) {
        overwrite(&mut self.id, &ev.id);
        overwrite(&mut self.object, &ev.object);
        if ev.created.is_some() {
            self.created = ev.created;
        }
        overwrite(&mut self.model, &ev.model);
        overwrite(&mut self.system_fingerprint, &ev.system_fingerprint);
        if let Some(u) = &ev.usage {
            self.usage = Some(u.clone());
        }
    }
}

#[derive(Default)]
struct ChoiceAcc {
    role: Option<String>,
    content: String,
    reasoning_content: String,
    tool_calls: BTreeMap<u32, AggregatedToolCall>,
    finish_reason: Option<String>,
    logprobs: Option<Value>,
}

impl ChoiceAcc {
    fn apply(&mut self, choice: &ChoiceDelta) {
        if let Some(delta) = &choice.delta {
            overwrite(&mut self.role, &delta.role);
            if let Some(s) = &delta.content {
                self.content.push_str(s);
            }
            if let Some(s) = &delta.reasoning_content {
                self.reasoning_content.push_str(s);
            }
            if delta.logprobs.is_some() {
                self.logprobs.clone_from(&delta.logprobs);
            }
            for tc in delta.tool_calls.iter().flatten() {
                let acc = self
                    .tool_calls
                    .entry(tc.index)
                    .or_insert_with(|| AggregatedToolCall {
                        index: tc.index,
                        ..Default::default()
                    });
                if let Some(id) = &tc.id {
                    acc.id.push_str(id);
                }
                overwrite(&mut acc.kind, &tc.kind);
                if let Some(f) = &tc.function {
                    if let Some(name) = &f.name {
                        acc.function.name.push_str(name);
                    }
                    if let Some(args) = &f.arguments {
                        acc.function.arguments.push_str(args);
                    }
                }
            }
        }
        overwrite(&mut self.finish_reason, &choice.finish_reason);
        if choice.logprobs.is_some() {
            self.logprobs.clone_from(&choice.logprobs);
        }
    }

    fn finish(self, index: u32) -> AggregatedChoice {
        AggregatedChoice {
            index,
            role: self.role,
            content: self.content,
            reasoning_content: self.reasoning_content,
            tool_calls: self.tool_calls.into_values().collect(),
            finish_reason: self
                .finish_reason
                .unwrap_or_else(|| UNKNOWN_FINISH.to_string()),
            logprobs: self.logprobs,
        }
    }
}

/// Last non-empty value wins.
fn overwrite(slot: &mut Option<String>, incoming: &Option<String>) {
    if let Some(v) = incoming
        && !v.is_empty()
    {
        *slot = Some(v.clone());
    }
}

/// Fold a complete chunk sequence into one completion.
///
/// Choices and tool calls unseen before are created on first reference.
/// Output lists are sorted by index.
pub fn aggregate(events: &[ChunkEvent]) -> CoreResult<Assembled<ChatCompletion>> {
    if events.is_empty() {
        return Err(LlmViewError::EmptyInput);
    }
    let span = tracing::debug_span!("aggregate", llm.provider = "openai", stream.events = events.len());
    let _enter = span.enter();

    let mut envelope = Envelope::default();
    let mut choices: BTreeMap<u32, ChoiceAcc> = BTreeMap::new();
    for ev in events {
        envelope.absorb(ev);
        for choice in ev.choices.iter().flatten() {
            choices.entry(choice.index).or_default().apply(choice);
        }
    }

    let completion = ChatCompletion {
        id: envelope.id.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        object: envelope.object.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        created: envelope.created.unwrap_or(0),
        model: envelope.model.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        system_fingerprint: envelope.system_fingerprint,
        choices: choices
            .into_iter()
            .map(|(index, acc)| acc.finish(index))
            .collect(),
        usage: envelope.usage,
    };
    tracing::debug!(choices = completion.choices.len(), "aggregated chunk stream");

    let usage = completion.usage.as_ref();
    telemetry::emit(
        AggregationLog::new("openai")
            .model(&completion.model)
            .response_id(&completion.id)
            .counts(events.len(), completion.choices.len())
            .finish_reason_opt(completion.choices.first().map(|c| c.finish_reason.as_str()))
            .tokens(
                usage.and_then(|u| u.prompt_tokens),
                usage.and_then(|u| u.completion_tokens),
                usage.and_then(|u| u.total_tokens),
            ),
    );

    Ok(assemble(completion, events.len()))
}

/// Shape check for bare (marker-less) chunk lines.
pub fn looks_like_chunk(v: &Value) -> bool {
    v.get("choices").is_some_and(Value::is_array)
        || v.get("object").and_then(Value::as_str) == Some("chat.completion.chunk")
}

/// Parse a raw SSE body into typed chunks.
pub fn parse_stream(text: &str) -> Vec<ChunkEvent> {
    sse::decode_events(sse::parse_events(text, looks_like_chunk))
}

/// A chat completion request body (`model` plus `messages` or `prompt`).
pub fn is_request(v: &Value) -> bool {
    truthy(v.get("model")) && (truthy(v.get("messages")) || truthy(v.get("prompt")))
}

/// A non-streamed completion body (`choices` plus `model`).
pub fn is_response(v: &Value) -> bool {
    truthy(v.get("choices")) && truthy(v.get("model"))
}
