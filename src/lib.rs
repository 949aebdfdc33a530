pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transcoder;

pub(crate) mod json_scan;

pub use error::XmlifyError;
pub use protocol::ToolCallDelta;
pub use registry::{StaticToolRegistry, ToolRegistry};
pub use session::{BatchOutput, CallPhase, StreamSession};
pub use transcoder::TranscoderState;
