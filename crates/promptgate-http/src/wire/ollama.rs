//! The Ollama-native wire format: newline-delimited JSON objects, a final
//! object carrying `"done": true`.

use super::ContentDelta;
use bytes::Bytes;
use promptgate_error::ErrorKind;
use serde::Serialize;
use serde_json::Value;

pub fn parse_content_delta(frame: &[u8]) -> ContentDelta {
    let Ok(value) = serde_json::from_slice::<Value>(frame) else {
        return ContentDelta::empty();
    };
    let is_end = value.get("done").and_then(Value::as_bool).unwrap_or(false);
    let content = value
        .get("response")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/message/content").and_then(Value::as_str))
        .unwrap_or("")
        .to_string();
    ContentDelta { content, is_end }
}

#[derive(Serialize)]
struct BlockedChunk<'a> {
    response: &'a str,
    done: bool,
    error: &'static str,
    message: &'a str,
    language: &'a str,
    failed_scanners: &'a [String],
}

pub fn format_blocked_frame(
    kind: ErrorKind,
    message: &str,
    language: &str,
    failed_scanners: &[String],
) -> Bytes {
    let chunk = BlockedChunk {
        response: "",
        done: true,
        error: kind.catalog_key(),
        message,
        language,
        failed_scanners,
    };
    let mut line = serde_json::to_vec(&chunk).expect("blocked chunk is always serializable");
    line.push(b'\n');
    Bytes::from(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_generate_style_response_field() {
        let delta = parse_content_delta(br#"{"model":"m","response":"hi","done":false}"#);
        assert_eq!(delta.content, "hi");
        assert!(!delta.is_end);
    }

    #[test]
    fn extracts_chat_style_message_content() {
        let delta = parse_content_delta(br#"{"message":{"role":"assistant","content":"hi"}}"#);
        assert_eq!(delta.content, "hi");
    }

    #[test]
    fn recognizes_end_of_stream_marker() {
        let delta = parse_content_delta(br#"{"response":"","done":true}"#);
        assert!(delta.is_end);
        assert_eq!(delta.content, "");
    }

    #[test]
    fn blocked_frame_carries_error_fields_and_trailing_newline() {
        let frame = format_blocked_frame(
            ErrorKind::ResponseBlocked,
            "blocked",
            "en",
            &["NoCode".to_string()],
        );
        assert!(frame.ends_with(b"\n"));
        let value: Value = serde_json::from_slice(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(value["done"], true);
        assert_eq!(value["error"], "response_blocked");
        assert_eq!(value["failed_scanners"][0], "NoCode");
    }
}
