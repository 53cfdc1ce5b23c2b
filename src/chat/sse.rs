//! Server-sent event framing for chat completion streams
//!
//! Only `data:` lines matter here. Each one carries either a JSON chunk in
//! the chat-completion shape, an `{"error": ...}` object, or the `[DONE]`
//! sentinel.

use serde::Deserialize;

/// Terminal sentinel payload
pub const DONE: &str = "[DONE]";

/// Final frame of a successful stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Incremental `data:` line decoder
///
/// Bytes are buffered until a newline arrives, so events and multi-byte
/// characters split across network chunks are reassembled.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the payloads of all `data:` lines completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line[..pos]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

/// Payload of a `data:` line, without the field name, one optional space and
/// a trailing carriage return
fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let value = line.strip_prefix("data:")?;
    Some(value.strip_prefix(' ').unwrap_or(value).to_string())
}

/// One decoded stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Incremental response text
    Delta(String),
    /// Stream finished
    Done,
    /// Relay or upstream reported a failure
    Error(String),
    /// Well-formed chunk without content (role headers, finish markers)
    Empty,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorField>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Content>,
    #[serde(default)]
    message: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Message(String),
    Object { message: String },
}

/// Parse a `data:` payload
///
/// # Errors
///
/// Returns error if the payload is neither `[DONE]` nor valid JSON
pub fn parse_event(payload: &str) -> Result<ChatEvent, serde_json::Error> {
    let payload = payload.trim();
    if payload == DONE {
        return Ok(ChatEvent::Done);
    }

    let chunk: Chunk = serde_json::from_str(payload)?;

    if let Some(error) = chunk.error {
        let message = match error {
            ErrorField::Message(m) | ErrorField::Object { message: m } => m,
        };
        return Ok(ChatEvent::Error(message));
    }

    let content = chunk.choices.into_iter().next().and_then(|choice| {
        choice
            .delta
            .and_then(|d| d.content)
            .or_else(|| choice.message.and_then(|m| m.content))
    });

    Ok(match content {
        Some(text) if !text.is_empty() => ChatEvent::Delta(text),
        _ => ChatEvent::Empty,
    })
}

/// Frame a text delta in the chat-completion chunk shape
#[must_use]
pub fn delta_frame(content: &str) -> String {
    let chunk = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {chunk}\n\n")
}

/// Frame a terminal error event
#[must_use]
pub fn error_frame(message: &str) -> String {
    let body = serde_json::json!({ "error": message });
    format!("data: {body}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\ndata: [DO"), vec!["{\"a\":1}"]);
        assert_eq!(decoder.push(b"NE]\n\n"), vec!["[DONE]"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn reassembles_split_utf8() {
        let frame = delta_frame("caf\u{e9}");
        let bytes = frame.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let payloads = decoder.push(&bytes[split..]);
        assert_eq!(
            parse_event(&payloads[0]).unwrap(),
            ChatEvent::Delta("caf\u{e9}".to_string())
        );
    }

    #[test]
    fn ignores_other_fields_and_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keepalive\r\nevent: message\r\ndata:[DONE]\r\n\r\n");
        assert_eq!(payloads, vec!["[DONE]"]);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("[DONE]"));
    }

    #[test]
    fn parses_delta_and_message_content() {
        assert_eq!(
            parse_event(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            ChatEvent::Delta("Hi".to_string())
        );
        assert_eq!(
            parse_event(r#"{"choices":[{"message":{"content":"Whole"}}]}"#).unwrap(),
            ChatEvent::Delta("Whole".to_string())
        );
        assert_eq!(
            parse_event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            ChatEvent::Empty
        );
    }

    #[test]
    fn parses_error_events() {
        assert_eq!(
            parse_event(r#"{"error":"Failed to get response from AI service"}"#).unwrap(),
            ChatEvent::Error("Failed to get response from AI service".to_string())
        );
        assert_eq!(
            parse_event(r#"{"error":{"message":"rate limited","code":429}}"#).unwrap(),
            ChatEvent::Error("rate limited".to_string())
        );
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_event("{not json").is_err());
    }

    #[test]
    fn frames_round_trip_through_decoder() {
        let mut decoder = SseDecoder::new();
        let wire = format!("{}{}", delta_frame("Hi \"there\""), DONE_FRAME);
        let events: Vec<ChatEvent> = decoder
            .push(wire.as_bytes())
            .iter()
            .map(|p| parse_event(p).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![ChatEvent::Delta("Hi \"there\"".to_string()), ChatEvent::Done]
        );
    }
}
