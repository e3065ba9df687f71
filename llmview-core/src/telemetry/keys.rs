/// Span/Log attribute keys for aggregation runs.
/// Keep these stable; log pipelines match on them.
pub const KEY_PROVIDER: &str = "llm.provider";
pub const KEY_MODEL: &str = "llm.model";
pub const KEY_RESPONSE_ID: &str = "llm.response_id";

pub const KEY_EVENT_COUNT: &str = "stream.events";
pub const KEY_ITEM_COUNT: &str = "stream.items";
pub const KEY_FINISH_REASON: &str = "finish.reason";
pub const KEY_TOKENS_PROMPT: &str = "tokens.prompt";
pub const KEY_TOKENS_COMPLETION: &str = "tokens.completion";
pub const KEY_TOKENS_TOTAL: &str = "tokens.total";
