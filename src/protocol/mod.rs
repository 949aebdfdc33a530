//! Provider wire formats decoded into [`ToolCallDelta`] batches.
//!
//! Nothing here talks to the network: input is text that has already been
//! received, fed in arbitrary chunks.

pub mod anthropic;
pub mod delta;
pub mod openai;

pub use anthropic::AnthropicDeltaDecoder;
pub use delta::{FunctionDelta, ToolCallDelta};
pub use openai::decode_openai_tool_deltas;

use crate::config::InputFormat;
use crate::error::XmlifyError;
use crate::stream::sse::{is_done_event, SseEvent, SseParser};

/// Incremental transcript decoder selected by [`InputFormat`].
///
/// `openai` and `anthropic` read SSE; each `data:` event becomes one batch.
/// `deltas` reads JSON lines, each line an array of deltas (a single delta
/// object is accepted too). Empty batches are not returned.
#[derive(Debug)]
pub enum DeltaSource {
    OpenAi { sse: SseParser, done: bool },
    Anthropic { sse: SseParser, decoder: AnthropicDeltaDecoder },
    Deltas { line_buffer: String },
}

impl DeltaSource {
    #[must_use]
    pub fn new(format: InputFormat) -> Self {
        match format {
            InputFormat::Openai => Self::OpenAi {
                sse: SseParser::new(),
                done: false,
            },
            InputFormat::Anthropic => Self::Anthropic {
                sse: SseParser::new(),
                decoder: AnthropicDeltaDecoder::new(),
            },
            InputFormat::Deltas => Self::Deltas {
                line_buffer: String::new(),
            },
        }
    }

    #[must_use]
    pub fn format(&self) -> InputFormat {
        match self {
            Self::OpenAi { .. } => InputFormat::Openai,
            Self::Anthropic { .. } => InputFormat::Anthropic,
            Self::Deltas { .. } => InputFormat::Deltas,
        }
    }

    /// Feed a chunk of transcript text and collect the batches it completes.
    ///
    /// # Errors
    ///
    /// Returns [`XmlifyError::Decode`] for a complete event or line that is
    /// not valid for the selected format.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<Vec<ToolCallDelta>>, XmlifyError> {
        let mut batches = Vec::new();
        match self {
            Self::OpenAi { sse, .. } | Self::Anthropic { sse, .. } => {
                let events = sse.feed(chunk);
                for event in &events {
                    self.push_event(event, &mut batches)?;
                }
            }
            Self::Deltas { line_buffer } => {
                line_buffer.push_str(chunk);
                let Some(last_newline) = line_buffer.rfind('\n') else {
                    return Ok(batches);
                };
                let complete: String = line_buffer.drain(..=last_newline).collect();
                for line in complete.lines() {
                    push_batch(decode_delta_line(line)?, &mut batches);
                }
            }
        }
        Ok(batches)
    }

    /// Flush anything left once the transcript has ended.
    ///
    /// # Errors
    ///
    /// Same as [`DeltaSource::feed`].
    pub fn finish(&mut self) -> Result<Vec<Vec<ToolCallDelta>>, XmlifyError> {
        let mut batches = Vec::new();
        match self {
            Self::OpenAi { sse, .. } | Self::Anthropic { sse, .. } => {
                if let Some(event) = sse.finish() {
                    self.push_event(&event, &mut batches)?;
                }
            }
            Self::Deltas { line_buffer } => {
                let tail = std::mem::take(line_buffer);
                push_batch(decode_delta_line(&tail)?, &mut batches);
            }
        }
        Ok(batches)
    }

    fn push_event(
        &mut self,
        event: &SseEvent,
        batches: &mut Vec<Vec<ToolCallDelta>>,
    ) -> Result<(), XmlifyError> {
        match self {
            Self::OpenAi { done, .. } => {
                if *done {
                    return Ok(());
                }
                if is_done_event(event) {
                    *done = true;
                    return Ok(());
                }
                push_batch(decode_openai_tool_deltas(&event.data)?, batches);
            }
            Self::Anthropic { decoder, .. } => {
                push_batch(decoder.decode(&event.data)?, batches);
            }
            Self::Deltas { .. } => {}
        }
        Ok(())
    }
}

fn push_batch(batch: Vec<ToolCallDelta>, batches: &mut Vec<Vec<ToolCallDelta>>) {
    if !batch.is_empty() {
        batches.push(batch);
    }
}

/// Decode one line of the `deltas` format. Blank lines yield nothing.
///
/// # Errors
///
/// Returns [`XmlifyError::Decode`] when the line is neither a delta array nor
/// a single delta object.
pub fn decode_delta_line(line: &str) -> Result<Vec<ToolCallDelta>, XmlifyError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    if line.starts_with('{') {
        return serde_json::from_str::<ToolCallDelta>(line)
            .map(|delta| vec![delta])
            .map_err(|e| XmlifyError::Decode(format!("invalid delta line: {e}")));
    }
    serde_json::from_str(line).map_err(|e| XmlifyError::Decode(format!("invalid delta line: {e}")))
}
