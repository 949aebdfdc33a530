pub mod sse;

pub use sse::{is_done_event, SseEvent, SseParser};
