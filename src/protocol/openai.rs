//! OpenAI-compatible chat-completion stream chunks.

use serde::Deserialize;

use super::delta::ToolCallDelta;
use crate::error::XmlifyError;

/// A streaming chunk. Only the parts needed to recover tool-call deltas are
/// modeled; everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
}

/// A choice within a stream chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAiDelta,
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiDelta {
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Extract the tool-call deltas carried by one chunk's `data` payload.
///
/// Only choice 0 is read; sessions track a single response. A chunk without
/// tool calls yields an empty batch.
///
/// # Errors
///
/// Returns [`XmlifyError::Decode`] when `data` is not a chunk object.
pub fn decode_openai_tool_deltas(data: &str) -> Result<Vec<ToolCallDelta>, XmlifyError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data)
        .map_err(|e| XmlifyError::Decode(format!("invalid OpenAI stream chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .filter(|choice| choice.index == 0)
        .filter_map(|choice| choice.delta.tool_calls)
        .flatten()
        .collect())
}
