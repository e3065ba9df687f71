use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::error::{CoreResult, LlmViewError};
use crate::model::Flow;

/// Bounded least-recently-used cache of flows keyed by flow id.
///
/// Shared by the async host client, hence the lock; every operation holds it
/// only for one map access.
#[derive(Debug)]
pub struct FlowCache {
    inner: Mutex<LruCache<String, Flow>>,
}

impl FlowCache {
    pub fn new(capacity: usize) -> CoreResult<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or_else(|| {
            LlmViewError::Validation("flow cache capacity must be non-zero".to_string())
        })?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(cap)),
        })
    }

    /// Look up a flow, marking it most recently used.
    pub fn get(&self, id: &str) -> Option<Flow> {
        self.lock().get(id).cloned()
    }

    /// Insert or replace a flow, evicting the least recently used entry when full.
    pub fn put(&self, flow: Flow) {
        self.lock().put(flow.id.clone(), flow);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Flow>> {
        // a poisoned cache still holds valid entries
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
