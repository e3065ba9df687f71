use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{Flow, FlowAction, Viewer};

/// LLM API family a flow belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    OpenAI,
    Anthropic,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a captured flow is traffic for one API family.
pub trait Detector: Send + Sync {
    fn kind(&self) -> ApiKind;
    fn detect(&self, flow: &Flow) -> bool;
}

/// Path-substring match on the chat/completions family of endpoints.
pub struct OpenAIDetector;

const OPENAI_PATHS: &[&str] = &[
    "/completions",
    "/chat/completions",
    "/embeddings",
    "/audio/transcriptions",
];

impl Detector for OpenAIDetector {
    fn kind(&self) -> ApiKind {
        ApiKind::OpenAI
    }

    fn detect(&self, flow: &Flow) -> bool {
        let path = flow.request.path.to_lowercase();
        OPENAI_PATHS.iter().any(|p| path.contains(p))
    }
}

/// Matches the Messages endpoint, ignoring any query string.
pub struct AnthropicDetector;

impl Detector for AnthropicDetector {
    fn kind(&self) -> ApiKind {
        ApiKind::Anthropic
    }

    fn detect(&self, flow: &Flow) -> bool {
        let path = flow.request.path.split('?').next().unwrap_or_default();
        !path.is_empty() && path.ends_with("/messages")
    }
}

/// Ordered set of detectors; the first match wins.
#[derive(Clone)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
            .with(Arc::new(OpenAIDetector))
            .with(Arc::new(AnthropicDetector))
    }
}

impl DetectorRegistry {
    /// An empty registry that recognises nothing.
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    pub fn with(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detect(&self, flow: &Flow) -> Option<ApiKind> {
        self.detectors
            .iter()
            .find(|d| d.detect(flow))
            .map(|d| d.kind())
    }
}

/// Content viewer to request for one side of a flow. Responses are chosen by
/// their content type so that event streams arrive unformatted.
pub fn viewer_for(flow: &Flow, action: FlowAction) -> Viewer {
    match action {
        FlowAction::Request => Viewer::Json,
        FlowAction::Response => match flow.response_header("content-type") {
            Some(ct) => {
                let ct = ct.to_lowercase();
                if ct.contains("application/json") {
                    Viewer::Json
                } else if ct.contains("text/event-stream") {
                    Viewer::Raw
                } else {
                    Viewer::Auto
                }
            }
            None => Viewer::Auto,
        },
    }
}
