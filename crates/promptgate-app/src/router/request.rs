//! Parses the two wire formats down to `(model, scannable_text, stream?)`,
//! per endpoint.

use promptgate_error::ProxyError;
use promptgate_http::WireFormat;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub model: String,
    pub scannable_text: String,
    pub stream: bool,
    pub wire_format: WireFormat,
}

fn require_model(value: &Value) -> Result<String, ProxyError> {
    value
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProxyError::bad_request("request body is missing a \"model\" field"))
}

fn parse_body(body: &[u8]) -> Result<Value, ProxyError> {
    serde_json::from_slice(body).map_err(|e| ProxyError::bad_request(format!("invalid JSON body: {e}")))
}

/// `messages[].content`, concatenated in order and role-labeled, per the
/// chat-style scannable-content rule.
fn join_messages(value: &Value) -> String {
    value
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .map(|m| {
                    let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
                    let content = m.get("content").and_then(Value::as_str).unwrap_or("");
                    format!("{role}: {content}")
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

pub fn parse_ollama_generate(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let scannable_text = value.get("prompt").and_then(Value::as_str).unwrap_or("").to_string();
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(true);
    Ok(ParsedRequest {
        model,
        scannable_text,
        stream,
        wire_format: WireFormat::Ollama,
    })
}

pub fn parse_ollama_chat(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(true);
    Ok(ParsedRequest {
        model,
        scannable_text: join_messages(&value),
        stream,
        wire_format: WireFormat::Ollama,
    })
}

pub fn parse_ollama_embed(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let scannable_text = match value.get("input") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    Ok(ParsedRequest {
        model,
        scannable_text,
        stream: false,
        wire_format: WireFormat::Ollama,
    })
}

pub fn parse_openai_chat_completions(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
    Ok(ParsedRequest {
        model,
        scannable_text: join_messages(&value),
        stream,
        wire_format: WireFormat::OpenAi,
    })
}

pub fn parse_openai_completions(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let scannable_text = value.get("prompt").and_then(Value::as_str).unwrap_or("").to_string();
    Ok(ParsedRequest {
        model,
        scannable_text,
        stream,
        wire_format: WireFormat::OpenAi,
    })
}

pub fn parse_openai_embeddings(body: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let value = parse_body(body)?;
    let model = require_model(&value)?;
    let scannable_text = match value.get("input") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    Ok(ParsedRequest {
        model,
        scannable_text,
        stream: false,
        wire_format: WireFormat::OpenAi,
    })
}
