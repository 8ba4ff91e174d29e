//! Server-Sent-Events wire formatting.

use serde_json::Value;

/// One SSE frame: an event with an optional id, or a keep-alive comment.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// `id: <n>\ndata: <json>\n\n` (id line omitted when zero).
    Event { id: u64, data: Value },
    /// A named event, used by the legacy transport's `endpoint` frame.
    Named { event: String, data: String },
    /// `: keep-alive\n\n`
    KeepAlive,
}

impl SseFrame {
    pub fn event(id: u64, data: Value) -> Self {
        SseFrame::Event { id, data }
    }

    /// Serialize to the on-wire form.
    pub fn format(&self) -> String {
        match self {
            SseFrame::Event { id, data } => {
                let payload = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
                if *id > 0 {
                    format!("id: {id}\ndata: {payload}\n\n")
                } else {
                    format!("data: {payload}\n\n")
                }
            }
            SseFrame::Named { event, data } => format!("event: {event}\ndata: {data}\n\n"),
            SseFrame::KeepAlive => ": keep-alive\n\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_with_id() {
        let frame = SseFrame::event(7, json!({"jsonrpc": "2.0", "method": "x"}));
        assert_eq!(
            frame.format(),
            "id: 7\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n\n"
        );
    }

    #[test]
    fn test_event_without_id() {
        let frame = SseFrame::event(0, json!(1));
        assert_eq!(frame.format(), "data: 1\n\n");
    }

    #[test]
    fn test_named_endpoint_event() {
        let frame = SseFrame::Named {
            event: "endpoint".to_string(),
            data: "/message?sessionId=abc".to_string(),
        };
        assert_eq!(frame.format(), "event: endpoint\ndata: /message?sessionId=abc\n\n");
    }

    #[test]
    fn test_keepalive_is_a_comment() {
        assert_eq!(SseFrame::KeepAlive.format(), ": keep-alive\n\n");
    }
}
