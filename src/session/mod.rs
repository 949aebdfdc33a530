//! Per-response tool-call session.
//!
//! A [`StreamSession`] accumulates provider deltas per tool-call index,
//! opens the outer `<tool>` tag once the registry recognizes the name, and
//! drives one [`TranscoderState`] per call so each batch yields only the XML
//! that became determinable since the previous one.

pub mod stream;

use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::protocol::ToolCallDelta;
use crate::registry::ToolRegistry;
use crate::transcoder::{build_temporary_json, TranscoderState};

// ---------------------------------------------------------------------------
// CallPhase
// ---------------------------------------------------------------------------

/// Lifecycle of one accumulated tool call. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallPhase {
    /// No registry-known name yet; nothing has been emitted.
    #[default]
    PendingName,
    /// `<name>` has been emitted; no argument text consumed yet.
    NameConfirmed,
    /// The transcoder has consumed argument text.
    StreamingArgs,
    /// `</name>` has been emitted.
    Closed,
}

const ALLOWED_TRANSITIONS: &[(CallPhase, CallPhase)] = &[
    (CallPhase::PendingName, CallPhase::NameConfirmed),
    (CallPhase::NameConfirmed, CallPhase::StreamingArgs),
    (CallPhase::NameConfirmed, CallPhase::Closed),
    (CallPhase::StreamingArgs, CallPhase::Closed),
];

impl CallPhase {
    #[must_use]
    pub fn can_transition_to(self, next: CallPhase) -> bool {
        ALLOWED_TRANSITIONS.contains(&(self, next))
    }

    /// True while the outer tag is open.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, CallPhase::NameConfirmed | CallPhase::StreamingArgs)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// What one delta changed for its call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallUpdate {
    pub index: u32,
    /// Confirmed tool name, empty while the name is unrecognized.
    pub tool_name: String,
    pub call_id: String,
    pub xml: String,
    pub phase: CallPhase,
    pub tentative_input: Option<Value>,
    pub final_input: Option<Value>,
}

/// Result of [`StreamSession::process_delta_batch`].
///
/// `xml` is every fragment produced by the batch in delta order. The other
/// top-level fields describe the call touched by the batch's last delta;
/// `calls` has one entry per delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutput {
    pub tool_name: String,
    pub call_id: String,
    pub xml: String,
    pub tentative_input: Option<Value>,
    pub final_input: Option<Value>,
    pub calls: Vec<CallUpdate>,
}

/// Read-only view of an accumulated call.
#[derive(Debug, Clone, Copy)]
pub struct CallView<'a> {
    pub index: u32,
    pub id: &'a str,
    pub name: &'a str,
    pub arguments: &'a str,
    pub phase: CallPhase,
    pub final_input: Option<&'a Value>,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub calls_seen: usize,
    pub calls_closed: usize,
    pub calls_unrecognized: usize,
    pub xml_bytes: usize,
}

/// Session behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Compute a repaired JSON snapshot for open calls after every delta.
    pub tentative_json: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tentative_json: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AccumulatedToolCall
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct AccumulatedToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
    phase: CallPhase,
    /// Tag name latched when `<name>` was emitted.
    confirmed_name: Option<Box<str>>,
    transcoder: TranscoderState,
    final_input: Option<Value>,
}

impl AccumulatedToolCall {
    fn new(index: u32) -> Self {
        Self {
            index,
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
            phase: CallPhase::PendingName,
            confirmed_name: None,
            transcoder: TranscoderState::new(),
            final_input: None,
        }
    }

    fn append(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = delta.id.as_deref() {
            self.id.push_str(id);
        }
        if let Some(name) = delta.name() {
            self.name.push_str(name);
        }
        if let Some(arguments) = delta.arguments() {
            self.arguments.push_str(arguments);
        }
    }

    fn transition(&mut self, next: CallPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                index = self.index,
                from = ?self.phase,
                to = ?next,
                "rejected call phase transition"
            );
            return;
        }
        tracing::debug!(index = self.index, from = ?self.phase, to = ?next, "call phase");
        self.phase = next;
    }

    fn tag_name(&self) -> &str {
        self.confirmed_name.as_deref().unwrap_or_default()
    }

    /// Emit whatever the accumulated text now determines.
    fn drive(&mut self, registry: &dyn ToolRegistry, out: &mut String) {
        if self.phase == CallPhase::PendingName && registry.is_tool_supported(&self.name) {
            self.confirmed_name = Some(Box::from(self.name.as_str()));
            out.push('<');
            out.push_str(&self.name);
            out.push_str(">\n");
            self.transition(CallPhase::NameConfirmed);
        }
        if !self.phase.is_open() {
            return;
        }

        self.transcoder.advance_into(&self.arguments, out);
        if self.phase == CallPhase::NameConfirmed && self.transcoder.cursor() > 0 {
            self.transition(CallPhase::StreamingArgs);
        }
        if self.transcoder.is_structurally_complete(&self.arguments) {
            self.close(out);
        }
    }

    /// Flush the transcoder and close the outer tag if it is open.
    fn finish(&mut self, out: &mut String) {
        if !self.phase.is_open() {
            return;
        }
        out.push_str(&self.transcoder.finish(&self.arguments));
        if self.phase == CallPhase::NameConfirmed && self.transcoder.cursor() > 0 {
            self.transition(CallPhase::StreamingArgs);
        }
        self.close(out);
    }

    fn close(&mut self, out: &mut String) {
        out.push_str("</");
        out.push_str(self.tag_name());
        out.push_str(">\n\n");
        self.transition(CallPhase::Closed);
        self.final_input = parse_final_input(self.index, &self.arguments);
    }

    fn tentative_input(&self) -> Option<Value> {
        if !self.phase.is_open() {
            return None;
        }
        build_temporary_json(&self.arguments, &self.transcoder).map(|repaired| repaired.value)
    }

    fn view(&self) -> CallView<'_> {
        CallView {
            index: self.index,
            id: &self.id,
            name: &self.name,
            arguments: &self.arguments,
            phase: self.phase,
            final_input: self.final_input.as_ref(),
        }
    }
}

fn parse_final_input(index: u32, arguments: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(index, error = %e, "tool call arguments are not valid JSON");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// StreamSession
// ---------------------------------------------------------------------------

/// Tool-call state for one model response.
pub struct StreamSession {
    registry: Arc<dyn ToolRegistry>,
    options: SessionOptions,
    /// Calls in first-seen order.
    calls: SmallVec<[AccumulatedToolCall; 2]>,
    xml_bytes: usize,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("options", &self.options)
            .field("calls", &self.calls)
            .field("xml_bytes", &self.xml_bytes)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    #[must_use]
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self::with_options(registry, SessionOptions::default())
    }

    #[must_use]
    pub fn with_options(registry: Arc<dyn ToolRegistry>, options: SessionOptions) -> Self {
        Self {
            registry,
            options,
            calls: SmallVec::new(),
            xml_bytes: 0,
        }
    }

    /// Apply one provider batch and return the XML it made determinable.
    pub fn process_delta_batch(&mut self, deltas: &[ToolCallDelta]) -> BatchOutput {
        let mut output = BatchOutput::default();
        for delta in deltas {
            let update = self.apply_delta(delta);
            output.xml.push_str(&update.xml);
            output.tool_name.clone_from(&update.tool_name);
            output.call_id.clone_from(&update.call_id);
            output.tentative_input.clone_from(&update.tentative_input);
            output.final_input.clone_from(&update.final_input);
            output.calls.push(update);
        }
        self.xml_bytes += output.xml.len();
        output
    }

    fn apply_delta(&mut self, delta: &ToolCallDelta) -> CallUpdate {
        let slot = self.slot_for(delta.index);
        let call = &mut self.calls[slot];
        call.append(delta);

        let mut xml = String::new();
        call.drive(self.registry.as_ref(), &mut xml);

        let tentative_input = if self.options.tentative_json {
            call.tentative_input()
        } else {
            None
        };
        CallUpdate {
            index: call.index,
            tool_name: call.tag_name().to_owned(),
            call_id: call.id.clone(),
            xml,
            phase: call.phase,
            tentative_input,
            final_input: call.final_input.clone(),
        }
    }

    fn slot_for(&mut self, index: u32) -> usize {
        if let Some(pos) = self.calls.iter().position(|call| call.index == index) {
            return pos;
        }
        tracing::debug!(index, "new tool call");
        self.calls.push(AccumulatedToolCall::new(index));
        self.calls.len() - 1
    }

    /// Close every call that is still open, in first-seen order.
    ///
    /// Truncated arguments are closed at the last consumed position. Calls
    /// whose name was never recognized produce nothing. Calling this again
    /// returns an empty string.
    pub fn finalize(&mut self) -> String {
        let mut out = String::new();
        for call in &mut self.calls {
            call.finish(&mut out);
        }
        self.xml_bytes += out.len();
        out
    }

    /// Forget all calls so the session can serve the next response.
    pub fn reset(&mut self) {
        self.calls.clear();
        self.xml_bytes = 0;
    }

    /// Accumulated calls in first-seen order.
    pub fn calls(&self) -> impl Iterator<Item = CallView<'_>> + '_ {
        self.calls.iter().map(AccumulatedToolCall::view)
    }

    /// Final structured inputs of closed, recognized calls, in first-seen
    /// order. Calls whose arguments failed to parse are skipped.
    pub fn final_inputs(&self) -> Vec<(CallView<'_>, &Value)> {
        self.calls
            .iter()
            .filter_map(|call| call.final_input.as_ref().map(|value| (call.view(), value)))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            calls_seen: self.calls.len(),
            calls_closed: self
                .calls
                .iter()
                .filter(|call| call.phase == CallPhase::Closed)
                .count(),
            calls_unrecognized: self
                .calls
                .iter()
                .filter(|call| call.phase == CallPhase::PendingName)
                .count(),
            xml_bytes: self.xml_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticToolRegistry;
    use serde_json::json;

    fn session() -> StreamSession {
        StreamSession::new(Arc::new(StaticToolRegistry::new([
            "read_file",
            "write_to_file",
            "toolName",
        ])))
    }

    fn args(index: u32, text: &str) -> ToolCallDelta {
        ToolCallDelta::new(index).with_arguments(text)
    }

    // -- phase table ---

    #[test]
    fn test_phase_transitions() {
        use CallPhase::*;
        assert!(PendingName.can_transition_to(NameConfirmed));
        assert!(NameConfirmed.can_transition_to(StreamingArgs));
        assert!(NameConfirmed.can_transition_to(Closed));
        assert!(StreamingArgs.can_transition_to(Closed));
        assert!(!PendingName.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(StreamingArgs));
        assert!(!StreamingArgs.can_transition_to(NameConfirmed));
    }

    // -- batches ---

    #[test]
    fn test_name_and_arguments_in_one_batch() {
        let mut session = session();
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_id("call_1")
            .with_name("toolName")
            .with_arguments(r#"{"a":1,"b":2}"#)]);
        assert_eq!(out.xml, "<toolName>\n<a>1</a>\n<b>2</b>\n</toolName>\n\n");
        assert_eq!(out.tool_name, "toolName");
        assert_eq!(out.call_id, "call_1");
        assert_eq!(out.final_input, Some(json!({"a": 1, "b": 2})));
        assert_eq!(out.tentative_input, None);
        assert_eq!(out.calls[0].phase, CallPhase::Closed);
    }

    #[test]
    fn test_name_split_across_deltas() {
        let mut session = session();
        let out = session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_")]);
        assert_eq!(out.xml, "");
        assert_eq!(out.tool_name, "");
        let out = session.process_delta_batch(&[ToolCallDelta::new(0).with_name("file")]);
        assert_eq!(out.xml, "<read_file>\n");
        assert_eq!(out.tool_name, "read_file");
        assert_eq!(out.calls[0].phase, CallPhase::NameConfirmed);
    }

    #[test]
    fn test_confirmed_name_is_latched() {
        let mut session = session();
        session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_file")]);
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("_extra")
            .with_arguments("{}")]);
        assert_eq!(out.xml, "</read_file>\n\n");
        assert_eq!(out.tool_name, "read_file");
        let view = session.calls().next().unwrap();
        assert_eq!(view.name, "read_file_extra");
    }

    #[test]
    fn test_tentative_input_while_open() {
        let mut session = session();
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("write_to_file")
            .with_arguments(r#"{"path":"a.txt","content":"hel"#)]);
        assert_eq!(
            out.tentative_input,
            Some(json!({"path": "a.txt", "content": "hel"}))
        );
        assert_eq!(out.final_input, None);
        assert_eq!(out.calls[0].phase, CallPhase::StreamingArgs);
    }

    #[test]
    fn test_tentative_input_can_be_disabled() {
        let registry: Arc<dyn ToolRegistry> = Arc::new(StaticToolRegistry::new(["t"]));
        let mut session = StreamSession::with_options(
            registry,
            SessionOptions {
                tentative_json: false,
            },
        );
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("t")
            .with_arguments(r#"{"a":"x"#)]);
        assert_eq!(out.tentative_input, None);
        assert_eq!(out.xml, "<t>\n<a>x");
    }

    #[test]
    fn test_unknown_tool_suppressed() {
        let mut session = session();
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("nope")
            .with_arguments(r#"{"a":1}"#)]);
        assert_eq!(out.xml, "");
        assert_eq!(out.tool_name, "");
        assert_eq!(out.tentative_input, None);
        assert_eq!(session.finalize(), "");
        assert_eq!(session.stats().calls_unrecognized, 1);
    }

    #[test]
    fn test_arguments_before_name_are_buffered() {
        let mut session = session();
        let out = session.process_delta_batch(&[args(0, r#"{"path":""#)]);
        assert_eq!(out.xml, "");
        let out = session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_file")]);
        assert_eq!(out.xml, "<read_file>\n<path>");
    }

    #[test]
    fn test_interleaved_indices() {
        let mut session = session();
        let out = session.process_delta_batch(&[
            ToolCallDelta::new(1).with_name("read_file"),
            ToolCallDelta::new(0).with_name("write_to_file"),
            args(1, r#"{"path":"a"}"#),
            args(0, r#"{"path":"b""#),
        ]);
        assert_eq!(
            out.xml,
            "<read_file>\n<write_to_file>\n<path>a</path>\n</read_file>\n\n<path>b</path>\n"
        );
        assert_eq!(out.tool_name, "write_to_file");
        assert_eq!(out.calls.len(), 4);
        assert_eq!(out.calls[2].final_input, Some(json!({"path": "a"})));

        let order: Vec<u32> = session.calls().map(|call| call.index).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_text_after_close_is_ignored() {
        let mut session = session();
        session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("toolName")
            .with_arguments("{}")]);
        let out = session.process_delta_batch(&[args(0, r#"{"b":2}"#)]);
        assert_eq!(out.xml, "");
        assert_eq!(out.calls[0].phase, CallPhase::Closed);
        assert_eq!(out.final_input, Some(json!({})));
    }

    // -- finalize ---

    #[test]
    fn test_finalize_closes_truncated_call() {
        let mut session = session();
        let out = session.process_delta_batch(&[ToolCallDelta::new(0)
            .with_name("write_to_file")
            .with_arguments(r#"{"path":"a.txt","content":"hel"#)]);
        assert_eq!(out.xml, "<write_to_file>\n<path>a.txt</path>\n<content>hel");
        assert_eq!(session.finalize(), "</content>\n</write_to_file>\n\n");
        assert_eq!(session.finalize(), "");
        let view = session.calls().next().unwrap();
        assert_eq!(view.phase, CallPhase::Closed);
        assert_eq!(view.final_input, None);
    }

    #[test]
    fn test_finalize_name_only_call() {
        let mut session = session();
        session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_file")]);
        assert_eq!(session.finalize(), "</read_file>\n\n");
        assert_eq!(session.calls().next().unwrap().phase, CallPhase::Closed);
    }

    #[test]
    fn test_finalize_in_first_seen_order() {
        let mut session = session();
        session.process_delta_batch(&[
            ToolCallDelta::new(3).with_name("read_file"),
            ToolCallDelta::new(0).with_name("toolName"),
        ]);
        assert_eq!(session.finalize(), "</read_file>\n\n</toolName>\n\n");
    }

    // -- accessors ---

    #[test]
    fn test_final_inputs_and_stats() {
        let mut session = session();
        let out = session.process_delta_batch(&[
            ToolCallDelta::new(0)
                .with_name("read_file")
                .with_arguments(r#"{"path":"x"}"#),
            ToolCallDelta::new(1).with_name("other"),
            ToolCallDelta::new(2)
                .with_name("toolName")
                .with_arguments(r#"{"a":"#),
        ]);
        session.finalize();
        let finals = session.final_inputs();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].0.name, "read_file");
        assert_eq!(finals[0].1, &json!({"path": "x"}));

        let stats = session.stats();
        assert_eq!(stats.calls_seen, 3);
        assert_eq!(stats.calls_closed, 2);
        assert_eq!(stats.calls_unrecognized, 1);
        assert!(stats.xml_bytes > out.xml.len());
    }

    #[test]
    fn test_reset_clears_calls() {
        let mut session = session();
        session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_file")]);
        session.reset();
        assert_eq!(session.calls().count(), 0);
        assert_eq!(session.finalize(), "");
        assert_eq!(session.stats(), SessionStats::default());

        let out = session.process_delta_batch(&[ToolCallDelta::new(0).with_name("read_file")]);
        assert_eq!(out.xml, "<read_file>\n");
    }
}
