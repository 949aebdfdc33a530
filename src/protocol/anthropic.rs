//! Anthropic Messages stream events.

use rustc_hash::FxHashSet;
use serde::Deserialize;

use super::delta::ToolCallDelta;
use crate::error::XmlifyError;

/// Anthropic SSE stream event. Events that never carry tool input collapse
/// into [`AnthropicStreamEvent::Other`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicStreamEvent {
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: u32,
        content_block: AnthropicContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: AnthropicDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

/// Content block announced by `content_block_start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

/// Delta variants for content block deltas.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicDelta {
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Turns Anthropic stream events into [`ToolCallDelta`]s keyed by content
/// block index.
///
/// `tool_use` blocks arrive with their complete id and name up front, so the
/// first delta for an index carries both; `input_json_delta` payloads become
/// argument suffixes. Deltas for blocks that were never announced as
/// `tool_use`, or that have since stopped, are dropped.
#[derive(Debug, Default)]
pub struct AnthropicDeltaDecoder {
    tool_blocks: FxHashSet<u32>,
}

impl AnthropicDeltaDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one event's `data` payload.
    ///
    /// # Errors
    ///
    /// Returns [`XmlifyError::Decode`] when `data` is not an event object.
    pub fn decode(&mut self, data: &str) -> Result<Vec<ToolCallDelta>, XmlifyError> {
        let event: AnthropicStreamEvent = serde_json::from_str(data)
            .map_err(|e| XmlifyError::Decode(format!("invalid Anthropic stream event: {e}")))?;
        Ok(self.decode_event(event).into_iter().collect())
    }

    pub fn decode_event(&mut self, event: AnthropicStreamEvent) -> Option<ToolCallDelta> {
        match event {
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicContentBlock::ToolUse { id, name },
            } => {
                self.tool_blocks.insert(index);
                Some(ToolCallDelta::new(index).with_id(id).with_name(name))
            }
            AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::InputJsonDelta { partial_json },
            } if self.tool_blocks.contains(&index) => {
                Some(ToolCallDelta::new(index).with_arguments(partial_json))
            }
            AnthropicStreamEvent::ContentBlockStop { index } => {
                self.tool_blocks.remove(&index);
                None
            }
            AnthropicStreamEvent::MessageStop => {
                self.tool_blocks.clear();
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_use_start_carries_id_and_name() {
        let mut decoder = AnthropicDeltaDecoder::new();
        let deltas = decoder
            .decode(r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"read_file","input":{}}}"#)
            .unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].index, 1);
        assert_eq!(deltas[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(deltas[0].name(), Some("read_file"));
        assert_eq!(deltas[0].arguments(), None);
    }

    #[test]
    fn test_input_json_delta_becomes_arguments() {
        let mut decoder = AnthropicDeltaDecoder::new();
        decoder
            .decode(r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"x","input":{}}}"#)
            .unwrap();
        let deltas = decoder
            .decode(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#)
            .unwrap();
        assert_eq!(deltas[0].arguments(), Some(r#"{"a":"#));
    }

    #[test]
    fn test_text_blocks_ignored() {
        let mut decoder = AnthropicDeltaDecoder::new();
        let start = decoder
            .decode(r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#)
            .unwrap();
        assert!(start.is_empty());
        let delta = decoder
            .decode(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#)
            .unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_unannounced_json_delta_dropped() {
        let mut decoder = AnthropicDeltaDecoder::new();
        let deltas = decoder
            .decode(r#"{"type":"content_block_delta","index":3,"delta":{"type":"input_json_delta","partial_json":"{"}}"#)
            .unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_bookkeeping_events_ignored() {
        let mut decoder = AnthropicDeltaDecoder::new();
        for data in [
            r#"{"type":"message_start","message":{"id":"m","type":"message","role":"assistant","model":"c","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":5}}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            assert!(decoder.decode(data).unwrap().is_empty(), "{data}");
        }
    }

    #[test]
    fn test_json_delta_after_block_stop_dropped() {
        let mut decoder = AnthropicDeltaDecoder::new();
        decoder
            .decode(r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"t","name":"x","input":{}}}"#)
            .unwrap();
        assert!(decoder
            .decode(r#"{"type":"content_block_stop","index":2}"#)
            .unwrap()
            .is_empty());
        let deltas = decoder
            .decode(r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"}"}}"#)
            .unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_invalid_event_is_decode_error() {
        let mut decoder = AnthropicDeltaDecoder::new();
        assert!(matches!(
            decoder.decode("not json"),
            Err(XmlifyError::Decode(_))
        ));
    }
}
