//! Per-provider stream vocabularies and aggregators.

pub mod anthropic;
pub mod openai;

use serde_json::Value;

use crate::detector::ApiKind;
use crate::model::FlowAction;

/// JSON truthiness as the body shape checks need it: absent, null, false,
/// zero and the empty string are all "missing".
pub(crate) fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

/// Does a decoded body look like the given side of an exchange with `api`?
pub fn looks_like(api: ApiKind, action: FlowAction, body: &Value) -> bool {
    match (api, action) {
        (ApiKind::OpenAI, FlowAction::Request) => openai::is_request(body),
        (ApiKind::OpenAI, FlowAction::Response) => openai::is_response(body),
        (ApiKind::Anthropic, FlowAction::Request) => anthropic::is_request(body),
        (ApiKind::Anthropic, FlowAction::Response) => anthropic::is_response(body),
    }
}
