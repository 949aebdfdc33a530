//! Incremental Server-Sent Events parsing for recorded or live provider
//! transcripts.
//!
//! Text may arrive split at any byte boundary; complete events are handed
//! back as soon as their terminating blank line has been seen.

use memchr::memchr_iter;

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

// ---------------------------------------------------------------------------
// SseParser
// ---------------------------------------------------------------------------

/// Line-oriented SSE parser that buffers partial lines between feeds.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buffer: String,
    pending: PendingEvent,
    last_event_id: Option<String>,
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: String,
    has_data: bool,
    retry: Option<u64>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append completed events to `out`.
    ///
    /// `data:` lines accumulate joined with `\n`; one leading space after the
    /// field colon is stripped; `:` lines are comments; unknown fields are
    /// ignored.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.line_buffer.push_str(chunk);
        let mut consumed = 0;
        for newline in memchr_iter(b'\n', self.line_buffer.as_bytes()) {
            let line = &self.line_buffer[consumed..newline];
            let line = line.strip_suffix('\r').unwrap_or(line);
            Self::process_line(line, &mut self.pending, &mut self.last_event_id, out);
            consumed = newline + 1;
        }
        if consumed > 0 {
            self.line_buffer.drain(..consumed);
        }
    }

    /// Dispatch whatever is still buffered once the input has ended. A final
    /// line without a trailing newline counts as a complete line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let mut out = Vec::with_capacity(1);
        if !self.line_buffer.is_empty() {
            let tail = std::mem::take(&mut self.line_buffer);
            let line = tail.strip_suffix('\r').unwrap_or(&tail);
            Self::process_line(line, &mut self.pending, &mut self.last_event_id, &mut out);
        }
        Self::process_line("", &mut self.pending, &mut self.last_event_id, &mut out);
        out.pop()
    }

    fn process_line(
        line: &str,
        pending: &mut PendingEvent,
        last_event_id: &mut Option<String>,
        out: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            if pending.has_data {
                let done = std::mem::take(pending);
                out.push(SseEvent {
                    event: done.event,
                    data: done.data,
                    id: last_event_id.clone(),
                    retry: done.retry,
                });
            } else {
                *pending = PendingEvent::default();
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if pending.has_data {
                    pending.data.push('\n');
                }
                pending.has_data = true;
                pending.data.push_str(value);
            }
            "event" => pending.event = Some(value.to_owned()),
            "id" => *last_event_id = Some(value.to_owned()),
            "retry" => pending.retry = value.trim().parse().ok(),
            _ => {}
        }
    }
}

/// True for the OpenAI-style `[DONE]` terminator.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}
