//! Core data model of the streaming session engine.
//!
//! - [`Session`] / [`SessionState`] model one streaming run and its lifecycle
//! - [`FrameChunk`] is a raw captured frame on its way to the service
//! - [`ProcessedChunk`] is a processed frame pushed back by the service
//! - [`VideoGeometry`] describes raw frame and decode target dimensions
//! - [`SessionEvent`] is the notification stream observed by the host

mod chunk;
mod event;
mod geometry;
mod session;

pub use chunk::{FrameChunk, ProcessedChunk, TIMESTAMP_PREFIX_LEN};
pub use event::SessionEvent;
pub use geometry::VideoGeometry;
pub use session::{Session, SessionSnapshot, SessionState};
