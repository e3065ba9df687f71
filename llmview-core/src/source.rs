use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::cache::FlowCache;
use crate::config::Config;
use crate::detector::DetectorRegistry;
use crate::error::{CoreResult, LlmViewError};
use crate::http_client::HttpClient;
use crate::model::{Flow, FlowAction, FlowContent, Viewer};

/// Where captured flows and their bodies come from.
#[async_trait]
pub trait FlowSource: Send + Sync {
    fn name(&self) -> &str;
    /// Every flow the source currently knows about.
    async fn flows(&self) -> CoreResult<Vec<Flow>>;
    async fn flow(&self, id: &str) -> CoreResult<Flow>;
    async fn content(&self, id: &str, action: FlowAction, viewer: Viewer) -> CoreResult<FlowContent>;
}

/// Client for the mitmweb REST endpoints.
pub struct MitmwebClient {
    http: HttpClient,
    base: String,
    cache: FlowCache,
    detectors: DetectorRegistry,
}

impl MitmwebClient {
    pub fn new(http: HttpClient, base: impl Into<String>, cache: FlowCache) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            http,
            base,
            cache,
            detectors: DetectorRegistry::default(),
        }
    }

    pub fn with_detectors(mut self, detectors: DetectorRegistry) -> Self {
        self.detectors = detectors;
        self
    }

    /// Build a client from configuration. The bearer token, when configured,
    /// is read from the named environment variable here and nowhere else.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        cfg.validate()?;
        let mut http = HttpClient::new(&cfg.http)?;
        if let Some(var) = &cfg.host.token_env {
            let token = std::env::var(var).map_err(|_| {
                LlmViewError::Validation(format!("environment variable {var} is not set"))
            })?;
            http = http.with_bearer(SecretString::new(token.into()));
        }
        let cache = FlowCache::new(cfg.cache.capacity)?;
        Ok(Self::new(http, cfg.host.base_url.clone(), cache))
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn cache(&self) -> &FlowCache {
        &self.cache
    }
}

#[async_trait]
impl FlowSource for MitmwebClient {
    fn name(&self) -> &str {
        "mitmweb"
    }

    async fn flows(&self) -> CoreResult<Vec<Flow>> {
        let url = format!("{}/flows", self.base);
        let (flows, latency) = self.http.get_json::<Vec<Flow>>(&url).await?;
        tracing::debug!(count = flows.len(), latency_ms = latency, "listed flows");
        Ok(flows)
    }

    async fn flow(&self, id: &str) -> CoreResult<Flow> {
        if let Some(flow) = self.cache.get(id) {
            return Ok(flow);
        }
        let mut found = None;
        for flow in self.flows().await? {
            if self.detectors.detect(&flow).is_some() {
                self.cache.put(flow.clone());
            }
            if flow.id == id {
                found = Some(flow);
            }
        }
        found.ok_or_else(|| LlmViewError::FlowNotFound {
            flow_id: id.to_string(),
        })
    }

    async fn content(&self, id: &str, action: FlowAction, viewer: Viewer) -> CoreResult<FlowContent> {
        let url = format!(
            "{}/flows/{}/{}/content/{}.json",
            self.base,
            id,
            action.as_str(),
            viewer.as_str()
        );
        let (content, _) = self.http.get_json::<FlowContent>(&url).await?;
        Ok(content)
    }
}

/// Flows and bodies held in memory. The requested viewer is ignored; each
/// body is returned with the view name it was stored with.
#[derive(Default, Clone)]
pub struct MemorySource {
    flows: Vec<Flow>,
    contents: HashMap<(String, FlowAction), FlowContent>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.retain(|f| f.id != flow.id);
        self.flows.push(flow);
        self
    }

    pub fn with_content(mut self, id: &str, action: FlowAction, content: FlowContent) -> Self {
        self.contents.insert((id.to_string(), action), content);
        self
    }

    pub fn into_shared(self) -> Arc<dyn FlowSource> {
        Arc::new(self)
    }
}

#[async_trait]
impl FlowSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn flows(&self) -> CoreResult<Vec<Flow>> {
        Ok(self.flows.clone())
    }

    async fn flow(&self, id: &str) -> CoreResult<Flow> {
        self.flows
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| LlmViewError::FlowNotFound {
                flow_id: id.to_string(),
            })
    }

    async fn content(&self, id: &str, action: FlowAction, _viewer: Viewer) -> CoreResult<FlowContent> {
        self.contents
            .get(&(id.to_string(), action))
            .cloned()
            .ok_or_else(|| LlmViewError::FlowNotFound {
                flow_id: id.to_string(),
            })
    }
}
