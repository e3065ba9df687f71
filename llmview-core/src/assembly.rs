//! Final assembly of an aggregation run.

use serde::{Deserialize, Serialize};

/// An aggregated response in the provider's non-streaming envelope shape,
/// plus the number of stream events folded into it.
///
/// Serializes flat: the response's own fields followed by `eventCount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembled<T> {
    #[serde(flatten)]
    pub response: T,
    #[serde(rename = "eventCount")]
    pub event_count: usize,
}

impl<T> Assembled<T> {
    pub fn into_inner(self) -> T {
        self.response
    }
}

impl<T> std::ops::Deref for Assembled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.response
    }
}

pub fn assemble<T>(response: T, event_count: usize) -> Assembled<T> {
    Assembled {
        response,
        event_count,
    }
}
