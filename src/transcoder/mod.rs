//! Incremental JSON-to-XML argument transcoder.
//!
//! A [`TranscoderState`] owns the parse position for one tool call's
//! arguments text. Each call to [`TranscoderState::advance`] resumes at the
//! saved cursor, consumes whatever new characters are unambiguous, and
//! returns only the XML produced by that call.
//!
//! Key invariants:
//! - The cursor never moves backwards; consumed text is never re-scanned.
//! - Fragments concatenated in arrival order are always a prefix of the final
//!   rendering, so nothing speculative is emitted.
//! - Parse context lives in explicit bracket/tag stacks, so resuming after a
//!   chunk boundary needs no call-stack state.
//!
//! Rendering rules: object keys become tags, string values stream into text
//! content, array keys repeat once per element, and tags are indented with
//! one tab per object level below the outermost argument object.

pub mod escape;
pub mod repair;

use std::sync::LazyLock;

use memchr::memchr2;
use regex_lite::Regex;
use smallvec::SmallVec;

use crate::json_scan::{
    is_primitive_byte, last_non_ws_before, only_ws_from, skip_ws, starts_primitive, utf8_len,
};

use self::escape::{decode_escape, Escape};

pub use self::repair::{build_temporary_json, RepairedJson};

static NUMBER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?$").ok()
});

/// Grammar position at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    /// Before the root object's opening brace.
    #[default]
    ExpectRoot,
    /// After a colon, an array opener, or a comma inside an array.
    ExpectValue,
    /// After an object opener or a comma inside an object.
    ExpectKey,
    /// After a key's closing quote.
    ExpectColon,
    /// After a complete value.
    ExpectCommaOrClosing,
}

/// An open JSON container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Object,
    Array,
}

impl Bracket {
    #[must_use]
    pub const fn closer(self) -> char {
        match self {
            Bracket::Object => '}',
            Bracket::Array => ']',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    /// Progress needs input that has not arrived yet.
    Stall,
}

/// Parse state for one tool call's streamed arguments.
#[derive(Debug, Clone, Default)]
pub struct TranscoderState {
    cursor: usize,
    parser_state: ParserState,
    bracket_stack: SmallVec<[Bracket; 8]>,
    xml_tag_stack: SmallVec<[Box<str>; 8]>,
    in_string: bool,
    is_streaming_string_value: bool,
    is_escaped: bool,
    current_string: String,
    primitive_buffer: String,
    root_closed: bool,
}

impl TranscoderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn parser_state(&self) -> ParserState {
        self.parser_state
    }

    #[must_use]
    pub fn bracket_stack(&self) -> &[Bracket] {
        &self.bracket_stack
    }

    /// Tag names awaiting a closing tag, outermost first.
    pub fn xml_tag_stack(&self) -> impl Iterator<Item = &str> + '_ {
        self.xml_tag_stack.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn in_string(&self) -> bool {
        self.in_string
    }

    #[must_use]
    pub fn is_streaming_string_value(&self) -> bool {
        self.is_streaming_string_value
    }

    #[must_use]
    pub fn primitive_buffer(&self) -> &str {
        &self.primitive_buffer
    }

    /// Number of open JSON objects, the root included.
    #[must_use]
    pub fn object_depth(&self) -> usize {
        self.bracket_stack
            .iter()
            .filter(|b| matches!(b, Bracket::Object))
            .count()
    }

    /// True once the root object has been closed and nothing but whitespace
    /// follows it.
    #[must_use]
    pub fn is_structurally_complete(&self, arguments: &str) -> bool {
        self.root_closed
            && self.bracket_stack.is_empty()
            && self.cursor > 0
            && only_ws_from(arguments.as_bytes(), self.cursor)
    }

    /// Consume newly available text and return the XML it produced.
    ///
    /// Calling this again without new text returns an empty string and leaves
    /// the state untouched.
    pub fn advance(&mut self, arguments: &str) -> String {
        let mut out = String::new();
        self.advance_into(arguments, &mut out);
        out
    }

    /// Same as [`advance`](Self::advance) but appends into `out`.
    pub fn advance_into(&mut self, arguments: &str, out: &mut String) {
        let len = arguments.len();
        if self.cursor > len {
            tracing::warn!(
                cursor = self.cursor,
                len,
                "arguments text shrank below the transcoder cursor; ignoring"
            );
            return;
        }

        while self.cursor < len && !self.root_closed {
            let step = if self.in_string {
                if self.is_streaming_string_value {
                    self.step_string_value(arguments, out)
                } else {
                    self.step_key(arguments)
                }
            } else if !self.primitive_buffer.is_empty() {
                self.step_primitive(arguments, out)
            } else {
                self.step_structural(arguments, out)
            };
            if step == Step::Stall {
                break;
            }
        }
    }

    /// Flush remaining text and close every open tag.
    ///
    /// Text that cannot be consumed (an incomplete escape, a colon with no
    /// value after it) is dropped. Afterwards the state is closed and further
    /// calls return an empty string.
    pub fn finish(&mut self, arguments: &str) -> String {
        let mut out = self.advance(arguments);
        if self.root_closed || self.parser_state == ParserState::ExpectRoot {
            self.root_closed = true;
            return out;
        }

        if self.in_string {
            self.in_string = false;
            self.is_escaped = false;
            if self.is_streaming_string_value {
                self.is_streaming_string_value = false;
                self.close_scalar_value(&mut out);
            } else {
                self.current_string.clear();
                self.parser_state = ParserState::ExpectCommaOrClosing;
            }
        } else if !self.primitive_buffer.is_empty() {
            self.commit_primitive(&mut out);
        } else {
            match self.parser_state {
                ParserState::ExpectValue if self.top_bracket() == Some(Bracket::Object) => {
                    self.close_keyed_tag(&mut out);
                    self.parser_state = ParserState::ExpectCommaOrClosing;
                }
                ParserState::ExpectColon => {
                    self.current_string.clear();
                    self.parser_state = ParserState::ExpectCommaOrClosing;
                }
                _ => {}
            }
        }

        let bytes = arguments.as_bytes();
        while let Some(top) = self.top_bracket() {
            match top {
                Bracket::Object => self.close_object(&mut out),
                Bracket::Array => self.close_array(&mut out, bytes, self.cursor),
            }
        }
        self.xml_tag_stack.clear();
        self.root_closed = true;
        out
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn step_structural(&mut self, text: &str, out: &mut String) -> Step {
        let bytes = text.as_bytes();
        let i = skip_ws(bytes, self.cursor);
        self.cursor = i;
        let Some(&b) = bytes.get(i) else {
            return Step::Continue;
        };

        match self.parser_state {
            ParserState::ExpectRoot => {
                if b == b'{' {
                    self.bracket_stack.push(Bracket::Object);
                    self.parser_state = ParserState::ExpectKey;
                    self.cursor = i + 1;
                } else {
                    tracing::trace!(byte = b, "skipping text before root object");
                    self.skip_char(bytes);
                }
            }
            ParserState::ExpectKey => match b {
                b'"' => {
                    self.in_string = true;
                    self.is_streaming_string_value = false;
                    self.current_string.clear();
                    self.cursor = i + 1;
                }
                b'}' => {
                    self.cursor = i + 1;
                    self.close_object(out);
                }
                _ => self.skip_char(bytes),
            },
            ParserState::ExpectColon => {
                if b != b':' {
                    self.skip_char(bytes);
                    return Step::Continue;
                }
                let next = skip_ws(bytes, i + 1);
                let Some(&lookahead) = bytes.get(next) else {
                    return Step::Stall;
                };
                let key: Box<str> = std::mem::take(&mut self.current_string).into();
                if lookahead != b'[' {
                    self.push_indent(out);
                    push_open_tag(out, &key);
                }
                self.xml_tag_stack.push(key);
                self.parser_state = ParserState::ExpectValue;
                self.cursor = i + 1;
            }
            ParserState::ExpectValue => self.step_value_start(bytes, b, out),
            ParserState::ExpectCommaOrClosing => match b {
                b',' => {
                    self.parser_state = match self.top_bracket() {
                        Some(Bracket::Array) => ParserState::ExpectValue,
                        _ => ParserState::ExpectKey,
                    };
                    self.cursor = i + 1;
                }
                b'}' => {
                    self.cursor = i + 1;
                    self.close_object(out);
                }
                b']' => {
                    self.cursor = i + 1;
                    self.close_array(out, bytes, i);
                }
                _ => self.skip_char(bytes),
            },
        }
        Step::Continue
    }

    fn step_value_start(&mut self, bytes: &[u8], b: u8, out: &mut String) {
        let i = self.cursor;
        let in_array = self.top_bracket() == Some(Bracket::Array);
        match b {
            b'"' => {
                if in_array {
                    self.open_array_element(out);
                }
                self.in_string = true;
                self.is_streaming_string_value = true;
                self.cursor = i + 1;
            }
            b'{' => {
                if in_array {
                    self.open_array_element(out);
                }
                out.push('\n');
                self.bracket_stack.push(Bracket::Object);
                self.parser_state = ParserState::ExpectKey;
                self.cursor = i + 1;
            }
            b'[' => {
                if in_array {
                    if let Some(tag) = self.xml_tag_stack.last().cloned() {
                        self.xml_tag_stack.push(tag);
                    }
                }
                self.bracket_stack.push(Bracket::Array);
                self.parser_state = ParserState::ExpectValue;
                self.cursor = i + 1;
            }
            b']' => {
                self.cursor = i + 1;
                self.close_array(out, bytes, i);
            }
            b'}' => {
                self.cursor = i + 1;
                if !in_array {
                    self.close_keyed_tag(out);
                }
                self.close_object(out);
            }
            b if starts_primitive(b) => {
                self.primitive_buffer.push(char::from(b));
                self.cursor = i + 1;
            }
            _ => self.skip_char(bytes),
        }
    }

    fn step_string_value(&mut self, text: &str, out: &mut String) -> Step {
        let bytes = text.as_bytes();
        let start = self.cursor;
        let Some(rel) = memchr2(b'"', b'\\', &bytes[start..]) else {
            out.push_str(&text[start..]);
            self.cursor = bytes.len();
            return Step::Continue;
        };

        let pos = start + rel;
        out.push_str(&text[start..pos]);
        self.cursor = pos;
        if bytes[pos] == b'"' {
            self.cursor = pos + 1;
            self.in_string = false;
            self.is_streaming_string_value = false;
            self.close_scalar_value(out);
            return Step::Continue;
        }

        match decode_escape(&bytes[pos..]) {
            Escape::Complete { ch, len } => {
                out.push(ch);
                self.cursor = pos + len;
                Step::Continue
            }
            Escape::Incomplete => Step::Stall,
        }
    }

    fn step_key(&mut self, text: &str) -> Step {
        let bytes = text.as_bytes();
        let len = bytes.len();
        let mut i = self.cursor;

        while i < len {
            if self.is_escaped {
                let width = utf8_len(bytes[i]).min(len - i);
                self.current_string.push_str(&text[i..i + width]);
                self.is_escaped = false;
                i += width;
                continue;
            }
            let Some(rel) = memchr2(b'"', b'\\', &bytes[i..]) else {
                self.current_string.push_str(&text[i..]);
                i = len;
                break;
            };
            let pos = i + rel;
            self.current_string.push_str(&text[i..pos]);
            if bytes[pos] == b'\\' {
                self.current_string.push('\\');
                self.is_escaped = true;
                i = pos + 1;
            } else {
                self.cursor = pos + 1;
                self.in_string = false;
                self.current_string = decode_key(&self.current_string);
                self.parser_state = ParserState::ExpectColon;
                return Step::Continue;
            }
        }

        self.cursor = i;
        Step::Continue
    }

    fn step_primitive(&mut self, text: &str, out: &mut String) -> Step {
        let bytes = text.as_bytes();
        let start = self.cursor;
        let end = bytes[start..]
            .iter()
            .position(|&b| !is_primitive_byte(b))
            .map_or(bytes.len(), |rel| start + rel);
        self.primitive_buffer.push_str(&text[start..end]);
        self.cursor = end;
        if end < bytes.len() {
            // The delimiter itself is handled by the next structural step.
            self.commit_primitive(out);
        }
        Step::Continue
    }

    // -----------------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------------

    fn commit_primitive(&mut self, out: &mut String) {
        let token = std::mem::take(&mut self.primitive_buffer);
        let valid = is_valid_primitive(&token);
        if !valid {
            tracing::debug!(token = %token, "dropping invalid primitive token");
        }
        if self.top_bracket() == Some(Bracket::Array) {
            self.open_array_element(out);
        }
        if valid {
            out.push_str(&token);
        }
        self.close_scalar_value(out);
    }

    /// Close the tag around a finished string or primitive value. Array
    /// element tags stay on the stack for the next element.
    fn close_scalar_value(&mut self, out: &mut String) {
        if self.top_bracket() == Some(Bracket::Array) {
            if let Some(tag) = self.xml_tag_stack.last() {
                push_close_tag(out, tag);
            }
        } else if let Some(tag) = self.xml_tag_stack.pop() {
            push_close_tag(out, &tag);
        }
        self.parser_state = ParserState::ExpectCommaOrClosing;
    }

    /// Close a key's tag that was opened at its colon but never got a value.
    fn close_keyed_tag(&mut self, out: &mut String) {
        if let Some(tag) = self.xml_tag_stack.pop() {
            push_close_tag(out, &tag);
        }
    }

    fn open_array_element(&self, out: &mut String) {
        if let Some(tag) = self.xml_tag_stack.last() {
            self.push_indent(out);
            push_open_tag(out, tag);
        }
    }

    fn close_object(&mut self, out: &mut String) {
        if self.top_bracket() != Some(Bracket::Object) {
            tracing::trace!(closer = "}", "ignoring unmatched closer");
            return;
        }
        self.bracket_stack.pop();
        self.parser_state = ParserState::ExpectCommaOrClosing;

        match self.top_bracket() {
            None => self.root_closed = true,
            Some(Bracket::Array) => {
                if let Some(tag) = self.xml_tag_stack.last() {
                    self.push_indent(out);
                    push_close_tag(out, tag);
                }
            }
            Some(Bracket::Object) => {
                if let Some(tag) = self.xml_tag_stack.pop() {
                    self.push_indent(out);
                    push_close_tag(out, &tag);
                }
            }
        }
    }

    /// `closer_pos` is where the array ends in `bytes`; an array whose last
    /// significant byte before that point is its own `[` is empty.
    fn close_array(&mut self, out: &mut String, bytes: &[u8], closer_pos: usize) {
        if self.top_bracket() != Some(Bracket::Array) {
            tracing::trace!(closer = "]", "ignoring unmatched closer");
            return;
        }
        self.bracket_stack.pop();
        self.parser_state = ParserState::ExpectCommaOrClosing;

        let empty = matches!(last_non_ws_before(bytes, closer_pos), Some((_, b'[')));
        if let Some(tag) = self.xml_tag_stack.pop() {
            if empty {
                self.push_indent(out);
                push_open_tag(out, &tag);
                push_close_tag(out, &tag);
            }
        }
    }

    fn push_indent(&self, out: &mut String) {
        for _ in 0..self.object_depth().saturating_sub(1) {
            out.push('\t');
        }
    }

    fn skip_char(&mut self, bytes: &[u8]) {
        let width = bytes.get(self.cursor).map_or(1, |&b| utf8_len(b));
        self.cursor = (self.cursor + width).min(bytes.len());
    }

    #[inline]
    fn top_bracket(&self) -> Option<Bracket> {
        self.bracket_stack.last().copied()
    }
}

#[inline]
fn push_open_tag(out: &mut String, tag: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
}

#[inline]
fn push_close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

/// Decode a raw key body with JSON string rules, keeping the raw text when it
/// is not a valid JSON string body.
fn decode_key(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_owned();
    }
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    quoted.push_str(raw);
    quoted.push('"');
    serde_json::from_str::<String>(&quoted).unwrap_or_else(|_| raw.to_owned())
}

/// Validate a committed unquoted token.
#[must_use]
pub fn is_valid_primitive(token: &str) -> bool {
    match token {
        "true" | "false" | "null" => true,
        _ => NUMBER_RE.as_ref().is_some_and(|re| re.is_match(token)),
    }
}

#[cfg(test)]
#[path = "transcoder_tests.rs"]
mod tests;
