use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::config::HttpCfg;
use crate::error::{CoreResult, LlmViewError};

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    bearer: Option<SecretString>,
}

impl HttpClient {
    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| LlmViewError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("llmview/", env!("CARGO_PKG_VERSION")).to_string(),
            bearer: None,
        })
    }

    pub fn new_default() -> CoreResult<Self> {
        Self::new(&HttpCfg::default())
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer(mut self, token: SecretString) -> Self {
        self.bearer = Some(token);
        self
    }

    /// GET a JSON document. Returns the decoded body and the latency in ms.
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> CoreResult<(R, u32)> {
        let start = Instant::now();
        let mut req = self
            .inner
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json");
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token.expose_secret());
        }

        let resp = req.send().await.map_err(|e| {
            tracing::debug!(url, error = %e, "host request failed");
            LlmViewError::HostUnavailable {
                host: host_of(url),
            }
        })?;

        let latency = start.elapsed().as_millis() as u32;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(url, status, &text));
        }

        let parsed = resp
            .json::<R>()
            .await
            .map_err(|e| LlmViewError::HostError {
                code: status.as_u16().to_string(),
                message: format!("json decode error: {e}"),
            })?;
        tracing::trace!(url, latency_ms = latency, "host request ok");
        Ok((parsed, latency))
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            })
        })
        .unwrap_or_else(|| url.to_string())
}

fn map_http_error(url: &str, status: StatusCode, body: &str) -> LlmViewError {
    match status {
        s if s.is_server_error() => LlmViewError::HostUnavailable {
            host: host_of(url),
        },
        s => LlmViewError::HostError {
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}
