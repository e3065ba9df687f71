use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which half of a captured exchange is being looked at.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FlowAction {
    Request,
    Response,
}

impl FlowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content viewer requested from the host; becomes the last path segment
/// of the content endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Auto,
    Json,
    Raw,
}

impl Viewer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Json => "json",
            Self::Raw => "raw",
        }
    }
}

/// How the host actually interpreted a body (`view_name` in the content reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentView {
    Json,
    Raw,
    Other(String),
}

impl From<&str> for ContentView {
    fn from(s: &str) -> Self {
        match s {
            "JSON" => Self::Json,
            "Raw" => Self::Raw,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Body of one side of a flow as returned by the content endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FlowContent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub view_name: String,
}

impl FlowContent {
    pub fn view(&self) -> ContentView {
        ContentView::from(self.view_name.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FlowRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    /// Either `[name, value]` pairs or `{name: value}` objects, depending on host version.
    #[serde(default)]
    pub headers: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FlowResponse {
    #[serde(default)]
    pub headers: Vec<Value>,
}

/// One captured request/response exchange as listed by the host.
/// Connection details the host also sends are dropped on decode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub request: FlowRequest,
    #[serde(default)]
    pub response: Option<FlowResponse>,
}

impl Flow {
    pub fn request_header(&self, name: &str) -> Option<&str> {
        find_header(&self.request.headers, name)
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| find_header(&r.headers, name))
    }
}

/// Case-insensitive header lookup over both header encodings.
fn find_header<'a>(headers: &'a [Value], name: &str) -> Option<&'a str> {
    for header in headers {
        match header {
            Value::Array(pair) => {
                if let (Some(Value::String(k)), Some(Value::String(v))) = (pair.first(), pair.get(1))
                    && k.eq_ignore_ascii_case(name)
                {
                    return Some(v.as_str());
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    if k.eq_ignore_ascii_case(name)
                        && let Some(s) = v.as_str()
                    {
                        return Some(s);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

static FLOW_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#/flows/([0-9a-fA-F\-]{36})/(request|response)").expect("static regex")
});

/// A flow id plus the side of it a UI location points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRef {
    pub id: String,
    pub action: FlowAction,
}

impl FlowRef {
    /// Parse a UI location such as `http://host/#/flows/<uuid>/response/body`.
    pub fn from_url(url: &str) -> Option<Self> {
        let caps = FLOW_URL.captures(url)?;
        let action = match &caps[2] {
            "request" => FlowAction::Request,
            _ => FlowAction::Response,
        };
        Some(Self {
            id: caps[1].to_string(),
            action,
        })
    }
}
