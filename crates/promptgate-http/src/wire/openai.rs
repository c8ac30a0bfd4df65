//! The OpenAI-compatible wire format: Server-Sent Events, `data: {json}`
//! frames terminated by a literal `data: [DONE]`.

use super::ContentDelta;
use bytes::Bytes;
use promptgate_error::ErrorKind;
use serde_json::{json, Value};

const DONE_MARKER: &str = "data: [DONE]";

pub fn parse_content_delta(frame: &[u8]) -> ContentDelta {
    let Ok(text) = std::str::from_utf8(frame) else {
        return ContentDelta::empty();
    };
    let text = text.trim();
    if text == DONE_MARKER {
        return ContentDelta {
            content: String::new(),
            is_end: true,
        };
    }
    let Some(payload) = text.strip_prefix("data:") else {
        return ContentDelta::empty();
    };
    let Ok(value) = serde_json::from_str::<Value>(payload.trim()) else {
        return ContentDelta::empty();
    };
    let content = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let is_end = value
        .pointer("/choices/0/finish_reason")
        .map(|v| !v.is_null())
        .unwrap_or(false);
    ContentDelta { content, is_end }
}

/// Extracts the full message content from a non-streaming chat-completion
/// response body, where the content lives at `choices[0].message.content`
/// rather than under a `delta`.
pub fn parse_full_content(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return String::new();
    };
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

pub fn format_blocked_frame(
    kind: ErrorKind,
    message: &str,
    language: &str,
    failed_scanners: &[String],
) -> Bytes {
    let body = json!({
        "error": {
            "type": kind.catalog_key(),
            "message": message,
            "language": language,
            "failed_scanners": failed_scanners,
        }
    });
    let mut out = format!("data: {}\n\n", body).into_bytes();
    out.extend_from_slice(format!("{}\n\n", DONE_MARKER).as_bytes());
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delta_content() {
        let frame = br#"data: {"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#;
        let delta = parse_content_delta(frame);
        assert_eq!(delta.content, "hi");
        assert!(!delta.is_end);
    }

    #[test]
    fn recognizes_done_marker() {
        let delta = parse_content_delta(b"data: [DONE]");
        assert!(delta.is_end);
        assert_eq!(delta.content, "");
    }

    #[test]
    fn recognizes_finish_reason_as_end() {
        let frame = br#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(parse_content_delta(frame).is_end);
    }

    #[test]
    fn blocked_frame_ends_with_done_marker() {
        let frame = format_blocked_frame(ErrorKind::ResponseBlocked, "blocked", "en", &[]);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.contains("response_blocked"));
        assert!(text.trim_end().ends_with(DONE_MARKER));
    }
}
