use serde::{Deserialize, Serialize};

use super::keys::*;

/// Structured, provider-agnostic record of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AggregationLog {
    /// "openai" or "anthropic".
    pub provider: Option<String>,
    pub model: Option<String>,
    pub response_id: Option<String>,

    /// Events folded into the result.
    pub event_count: usize,
    /// Choices (OpenAI) or content blocks (Anthropic) in the result.
    pub item_count: usize,

    /// Finish reason of the first choice, or the message stop reason.
    pub finish_reason: Option<String>,

    pub tokens_prompt: Option<u64>,
    pub tokens_completion: Option<u64>,
    pub tokens_total: Option<u64>,
}

impl AggregationLog {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            ..Default::default()
        }
    }
    pub fn model(mut self, v: &str) -> Self {
        self.model = Some(v.to_string());
        self
    }
    pub fn response_id(mut self, v: &str) -> Self {
        self.response_id = Some(v.to_string());
        self
    }
    pub fn counts(mut self, events: usize, items: usize) -> Self {
        self.event_count = events;
        self.item_count = items;
        self
    }
    pub fn finish_reason_opt(mut self, v: Option<&str>) -> Self {
        self.finish_reason = v.map(|s| s.to_string());
        self
    }
    pub fn tokens(mut self, p: Option<u64>, c: Option<u64>, t: Option<u64>) -> Self {
        self.tokens_prompt = p;
        self.tokens_completion = c;
        self.tokens_total = t;
        self
    }

    /// Populated fields as stable `(key, value)` attribute pairs.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |k: &'static str, v: Option<String>| {
            if let Some(v) = v {
                out.push((k, v));
            }
        };
        push(KEY_PROVIDER, self.provider.clone());
        push(KEY_MODEL, self.model.clone());
        push(KEY_RESPONSE_ID, self.response_id.clone());
        push(KEY_EVENT_COUNT, Some(self.event_count.to_string()));
        push(KEY_ITEM_COUNT, Some(self.item_count.to_string()));
        push(KEY_FINISH_REASON, self.finish_reason.clone());
        push(KEY_TOKENS_PROMPT, self.tokens_prompt.map(|n| n.to_string()));
        push(KEY_TOKENS_COMPLETION, self.tokens_completion.map(|n| n.to_string()));
        push(KEY_TOKENS_TOTAL, self.tokens_total.map(|n| n.to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregation_log_serializes() {
        let log = AggregationLog::new("openai")
            .model("gpt-4o")
            .response_id("chatcmpl-1")
            .counts(12, 1)
            .finish_reason_opt(Some("stop"))
            .tokens(Some(10), Some(20), Some(30));

        let as_json = serde_json::to_value(&log).unwrap();
        assert_eq!(as_json["provider"], json!("openai"));
        assert_eq!(as_json["model"], json!("gpt-4o"));
        assert_eq!(as_json["event_count"], json!(12));
        assert_eq!(as_json["item_count"], json!(1));
        assert_eq!(as_json["tokens_total"], json!(30));
        assert_eq!(as_json["finish_reason"], json!("stop"));
    }

    #[test]
    fn attributes_skip_missing_fields() {
        let log = AggregationLog::new("anthropic").counts(3, 0);
        let attrs = log.attributes();
        assert_eq!(
            attrs,
            vec![
                (KEY_PROVIDER, "anthropic".to_string()),
                (KEY_EVENT_COUNT, "3".to_string()),
                (KEY_ITEM_COUNT, "0".to_string()),
            ]
        );
    }
}
