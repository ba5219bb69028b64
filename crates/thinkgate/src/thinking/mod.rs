//! Reasoning region removal
//!
//! - [`tag_buffer`]: the incremental state machine
//! - [`transform`]: adapters for generate/chat payloads and both response modes

pub mod tag_buffer;
pub mod transform;

pub use tag_buffer::{BufferMode, Segment, TagBuffer};
pub use transform::{PayloadKind, ResponseTransform, Stripped, ThinkingFilter};
