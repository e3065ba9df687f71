use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::assembly::Assembled;
use crate::detector::{viewer_for, ApiKind, DetectorRegistry};
use crate::error::CoreResult;
use crate::model::{ContentView, FlowAction, FlowContent};
use crate::providers::{self, anthropic, openai};
use crate::source::FlowSource;

/// What a flow body turned out to be, ready for display.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum View {
    #[serde(rename = "request")]
    Request { api: ApiKind, body: Value },
    #[serde(rename = "response")]
    Response { api: ApiKind, body: Value },
    #[serde(rename = "openai_stream")]
    OpenAIStream(Assembled<openai::ChatCompletion>),
    #[serde(rename = "anthropic_stream")]
    AnthropicStream(Assembled<anthropic::Message>),
}

impl View {
    pub fn api(&self) -> ApiKind {
        match self {
            Self::Request { api, .. } | Self::Response { api, .. } => *api,
            Self::OpenAIStream(_) => ApiKind::OpenAI,
            Self::AnthropicStream(_) => ApiKind::Anthropic,
        }
    }
}

/// Decide how one side of an LLM flow should be shown.
///
/// `Ok(None)` means the body is not something this crate renders and the
/// host's own view should stay in place.
pub fn interpret(api: ApiKind, action: FlowAction, content: &FlowContent) -> CoreResult<Option<View>> {
    match (action, content.view()) {
        (FlowAction::Request, _) => Ok(json_body(api, action, &content.text)
            .map(|body| View::Request { api, body })),
        (FlowAction::Response, ContentView::Json) => Ok(json_body(api, action, &content.text)
            .map(|body| View::Response { api, body })),
        (FlowAction::Response, ContentView::Raw) => {
            let view = match api {
                ApiKind::OpenAI => {
                    let events = openai::parse_stream(&content.text);
                    if events.is_empty() {
                        return Ok(no_events(api));
                    }
                    View::OpenAIStream(openai::aggregate(&events)?)
                }
                ApiKind::Anthropic => {
                    let events = anthropic::parse_stream(&content.text);
                    if events.is_empty() {
                        return Ok(no_events(api));
                    }
                    View::AnthropicStream(anthropic::aggregate(&events)?)
                }
            };
            Ok(Some(view))
        }
        (FlowAction::Response, ContentView::Other(name)) => {
            tracing::debug!(view = %name, "response view not rendered");
            Ok(None)
        }
    }
}

/// A raw body with no recognisable events leaves the host view in place.
fn no_events(api: ApiKind) -> Option<View> {
    tracing::debug!(%api, "raw response has no stream events");
    None
}

fn json_body(api: ApiKind, action: FlowAction, text: &str) -> Option<Value> {
    let body: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(%api, %action, error = %e, "body is not JSON");
            return None;
        }
    };
    providers::looks_like(api, action, &body).then_some(body)
}

/// Ties a flow source to provider detection.
pub struct Inspector {
    source: Arc<dyn FlowSource>,
    detectors: DetectorRegistry,
}

impl Inspector {
    pub fn new(source: Arc<dyn FlowSource>) -> Self {
        Self {
            source,
            detectors: DetectorRegistry::default(),
        }
    }

    pub fn with_detectors(mut self, detectors: DetectorRegistry) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn source(&self) -> &dyn FlowSource {
        self.source.as_ref()
    }

    /// LLM flows known to the source, paired with their detected API.
    pub async fn llm_flows(&self) -> CoreResult<Vec<(crate::model::Flow, ApiKind)>> {
        let flows = self.source.flows().await?;
        Ok(flows
            .into_iter()
            .filter_map(|f| self.detectors.detect(&f).map(|api| (f, api)))
            .collect())
    }

    /// Fetch, detect and interpret one side of a flow.
    pub async fn inspect(&self, flow_id: &str, action: FlowAction) -> CoreResult<Option<View>> {
        let flow = self.source.flow(flow_id).await?;
        let Some(api) = self.detectors.detect(&flow) else {
            tracing::debug!(flow_id, "not an LLM flow");
            return Ok(None);
        };
        let viewer = viewer_for(&flow, action);
        tracing::debug!(flow_id, %api, %action, viewer = viewer.as_str(), source = self.source.name(), "inspecting flow");
        let content = self.source.content(flow_id, action, viewer).await?;
        interpret(api, action, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmViewError;
    use crate::model::Flow;
    use crate::source::MemorySource;
    use serde_json::json;

    fn content(text: &str, view_name: &str) -> FlowContent {
        FlowContent {
            text: text.into(),
            view_name: view_name.into(),
        }
    }

    const OPENAI_SSE: &str = "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":7,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n\
data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":7,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n\
data: [DONE]\n\n";

    const ANTHROPIC_SSE: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-5-sonnet\",\"content\":[],\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":2}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

    #[test]
    fn request_body_must_look_like_llm_request() {
        let ok = content(r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#, "JSON");
        let view = interpret(ApiKind::OpenAI, FlowAction::Request, &ok).unwrap().unwrap();
        assert!(matches!(view, View::Request { api: ApiKind::OpenAI, .. }));

        let not_llm = content(r#"{"model":"gpt-4o"}"#, "JSON");
        assert!(interpret(ApiKind::OpenAI, FlowAction::Request, &not_llm).unwrap().is_none());

        let not_json = content("model=gpt", "Raw");
        assert!(interpret(ApiKind::Anthropic, FlowAction::Request, &not_json).unwrap().is_none());
    }

    #[test]
    fn json_response_is_shape_checked_per_api() {
        let oa = content(r#"{"model":"gpt-4o","choices":[{"index":0}]}"#, "JSON");
        assert!(interpret(ApiKind::OpenAI, FlowAction::Response, &oa).unwrap().is_some());
        assert!(interpret(ApiKind::Anthropic, FlowAction::Response, &oa).unwrap().is_none());

        let an = content(r#"{"model":"claude","content":[{"type":"text","text":"x"}]}"#, "JSON");
        let view = interpret(ApiKind::Anthropic, FlowAction::Response, &an).unwrap().unwrap();
        assert_eq!(view.api(), ApiKind::Anthropic);
    }

    #[test]
    fn raw_openai_response_is_aggregated() {
        let view = interpret(ApiKind::OpenAI, FlowAction::Response, &content(OPENAI_SSE, "Raw"))
            .unwrap()
            .unwrap();
        let View::OpenAIStream(done) = view else {
            panic!("expected openai stream view");
        };
        assert_eq!(done.event_count, 2);
        assert_eq!(done.choices[0].content, "Hello");
        assert_eq!(done.choices[0].finish_reason, "stop");
    }

    #[test]
    fn raw_anthropic_response_is_aggregated() {
        let view = interpret(
            ApiKind::Anthropic,
            FlowAction::Response,
            &content(ANTHROPIC_SSE, "Raw"),
        )
        .unwrap()
        .unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["kind"], "anthropic_stream");
        assert_eq!(json["data"]["eventCount"], 5);
        assert_eq!(json["data"]["content"][0]["text"], "Hi");
        assert_eq!(json["data"]["stop_reason"], "end_turn");
        assert_eq!(json["data"]["usage"]["output_tokens"], 2);
    }

    #[test]
    fn raw_response_without_events_is_not_rendered() {
        for api in [ApiKind::OpenAI, ApiKind::Anthropic] {
            let blank = content("\n\n", "Raw");
            assert!(interpret(api, FlowAction::Response, &blank).unwrap().is_none());
            let html = content("<html>upstream error</html>\nevent: ping\n", "Raw");
            assert!(interpret(api, FlowAction::Response, &html).unwrap().is_none());
        }
        // the aggregators themselves still refuse an empty fold
        assert!(matches!(
            anthropic::aggregate(&[]).unwrap_err(),
            LlmViewError::EmptyInput
        ));
    }

    #[test]
    fn other_views_are_not_rendered() {
        let c = content("00 01 02", "Hex Dump");
        assert!(interpret(ApiKind::OpenAI, FlowAction::Response, &c).unwrap().is_none());
    }

    fn source() -> MemorySource {
        let chat: Flow = serde_json::from_value(json!({
            "id": "f-chat",
            "request": {"method": "POST", "path": "/v1/chat/completions", "headers": []},
            "response": {"headers": [["content-type", "text/event-stream"]]}
        }))
        .unwrap();
        let page: Flow = serde_json::from_value(json!({
            "id": "f-page",
            "request": {"method": "GET", "path": "/index.html", "headers": []}
        }))
        .unwrap();
        MemorySource::new()
            .with_flow(chat)
            .with_flow(page)
            .with_content("f-chat", FlowAction::Response, content(OPENAI_SSE, "Raw"))
    }

    #[tokio::test]
    async fn inspector_renders_detected_flows() {
        let inspector = Inspector::new(source().into_shared());
        let view = inspector
            .inspect("f-chat", FlowAction::Response)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.api(), ApiKind::OpenAI);

        assert!(inspector.inspect("f-page", FlowAction::Request).await.unwrap().is_none());
        assert!(matches!(
            inspector.inspect("missing", FlowAction::Request).await,
            Err(LlmViewError::FlowNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn llm_flows_filters_undetected() {
        let inspector = Inspector::new(source().into_shared());
        let flows = inspector.llm_flows().await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].0.id, "f-chat");
        assert_eq!(flows[0].1, ApiKind::OpenAI);
    }

    #[tokio::test]
    async fn empty_registry_renders_nothing() {
        let inspector =
            Inspector::new(source().into_shared()).with_detectors(DetectorRegistry::new());
        assert!(inspector.inspect("f-chat", FlowAction::Response).await.unwrap().is_none());
    }
}
