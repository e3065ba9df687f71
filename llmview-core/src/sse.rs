//! Splits a captured Server-Sent-Events body into discrete JSON event records.
//!
//! Contract:
//! - Records are lines starting with `data:`; the remainder is one JSON payload.
//! - `[DONE]` (bare or behind `data:`) ends the stream logically and is never parsed.
//! - A bare `{...}` line without the marker is accepted only when the caller's
//!   shape check recognises it as an event.
//! - A line that fails to parse is skipped; it never aborts the rest of the body.

use serde::de::DeserializeOwned;
use serde_json::Value;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one trimmed body line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Record<'a> {
    /// Payload of a `data:` line.
    Data(&'a str),
    /// A JSON-looking line without the marker.
    Bare(&'a str),
    Done,
    /// `event:`, `id:`, comments, blanks and anything else.
    Skip,
}

fn classify(line: &str) -> Record<'_> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
        let payload = rest.trim();
        // some proxies double the marker on the sentinel
        if payload == DONE_SENTINEL
            || payload
                .strip_prefix(DATA_PREFIX)
                .is_some_and(|p| p.trim() == DONE_SENTINEL)
        {
            return Record::Done;
        }
        return Record::Data(payload);
    }
    if line == DONE_SENTINEL {
        return Record::Done;
    }
    if line.starts_with('{') && line.ends_with('}') {
        return Record::Bare(line);
    }
    Record::Skip
}

/// Parse every event record in `text`, in order.
///
/// `is_event` is the duck-typed shape check applied to bare lines only; `data:`
/// records are trusted to be events.
pub fn parse_events<F>(text: &str, is_event: F) -> Vec<Value>
where
    F: Fn(&Value) -> bool,
{
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let mut events = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        match classify(line) {
            Record::Data(payload) => match serde_json::from_str::<Value>(payload) {
                Ok(v) => events.push(v),
                Err(e) => tracing::debug!(line = lineno + 1, error = %e, "skipping malformed event line"),
            },
            Record::Bare(payload) => match serde_json::from_str::<Value>(payload) {
                Ok(v) if is_event(&v) => events.push(v),
                Ok(_) => tracing::trace!(line = lineno + 1, "ignoring bare json line that is not an event"),
                Err(e) => tracing::debug!(line = lineno + 1, error = %e, "skipping malformed bare line"),
            },
            Record::Done | Record::Skip => {}
        }
    }
    events
}

/// Decode raw event values into a provider's typed events, dropping any that
/// do not fit the schema. Order is preserved.
pub fn decode_events<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value::<T>(v) {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::debug!(event = i, error = %e, "skipping event with unexpected shape");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn any(_: &Value) -> bool {
        true
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse_events("", any).is_empty());
        assert!(parse_events("\n\n", any).is_empty());
    }

    #[test]
    fn data_lines_parse_in_order_and_done_is_excluded() {
        let body = "data: {\"n\":1}\n\ndata:{\"n\":2}\n\ndata: [DONE]\n\n";
        let events = parse_events(body, any);
        assert_eq!(events, vec![json!({"n":1}), json!({"n":2})]);
    }

    #[test]
    fn bare_and_double_prefixed_done_are_excluded() {
        let body = "data: {\"n\":1}\n[DONE]\ndata: data: [DONE]\n";
        let events = parse_events(body, any);
        assert_eq!(events, vec![json!({"n":1})]);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let body = "data: {\"n\":1}\ndata: {\"n\":\ndata: {\"n\":3}\n";
        let events = parse_events(body, any);
        assert_eq!(events, vec![json!({"n":1}), json!({"n":3})]);
    }

    #[test]
    fn non_data_fields_are_ignored() {
        let body = ": keep-alive\nevent: message_start\nid: 7\nretry: 100\ndata: {\"type\":\"ping\"}\n";
        let events = parse_events(body, any);
        assert_eq!(events, vec![json!({"type":"ping"})]);
    }

    #[test]
    fn bare_lines_need_the_shape_check() {
        let body = "{\"type\":\"message_stop\"}\n{\"unrelated\":true}\n";
        let events = parse_events(body, |v| v.get("type").is_some_and(Value::is_string));
        assert_eq!(events, vec![json!({"type":"message_stop"})]);
    }

    #[test]
    fn crlf_and_bom_are_tolerated() {
        let body = "\u{FEFF}data: {\"n\":1}\r\n\r\ndata: [DONE]\r\n";
        let events = parse_events(body, any);
        assert_eq!(events, vec![json!({"n":1})]);
    }

    #[test]
    fn decode_drops_misfits() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Ev {
            n: u32,
        }
        let decoded: Vec<Ev> =
            decode_events(vec![json!({"n":1}), json!({"n":"x"}), json!({"n":3})]);
        assert_eq!(decoded, vec![Ev { n: 1 }, Ev { n: 3 }]);
    }
}
