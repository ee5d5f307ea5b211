//! Streaming session engine for a camera client of a remote frame-processing
//! service.
//!
//! camstream captures raw frames from a host-provided camera, uploads them to
//! the service one chunk at a time, and receives the processed frames back over
//! a push channel for display.
//!
//! # Features
//!
//! - **Session lifecycle**: start/stop state machine with duplicate-operation guards
//! - **Paced capture**: one frame per tick (5 frames/second by default), never queued
//! - **Best-effort upload**: concurrent, unordered, never retried
//! - **Push channel**: Socket.IO subscription that re-joins after every reconnect
//! - **Decode**: 4:2:0 semi-planar to RGB into a reusable raster, with a waveform
//!   fallback for payloads that are not frame-shaped
//!
//! The camera and the display stay with the host: implement [`FrameSource`] and
//! [`FrameRenderer`], then drive the session through a [`SessionHandle`].
//!
//! # Example
//!
//! ```rust,no_run
//! use camstream::{CamStream, SessionEvent, StreamConfig};
//! # use camstream::{FrameRenderer, FrameSource, Raster, Waveform};
//! # struct Camera;
//! # #[async_trait::async_trait]
//! # impl FrameSource for Camera {
//! #     fn is_ready(&self) -> bool { true }
//! #     async fn capture_frame(&mut self) -> camstream::Result<Option<bytes::Bytes>> { Ok(None) }
//! # }
//! # struct Screen;
//! # impl FrameRenderer for Screen {
//! #     fn present_raster(&mut self, _: &Raster) {}
//! #     fn present_fallback(&mut self, _: &Waveform) {}
//! # }
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> camstream::Result<()> {
//!     let config = StreamConfig::load("camstream.yaml")?;
//!     let (session, mut events) = CamStream::connect(&config, Camera, Screen)?;
//!
//!     session.start("dev-1").await?;
//!     while let Some(event) = events.next().await {
//!         match event {
//!             SessionEvent::Started { session_id } => println!("streaming as {}", session_id),
//!             SessionEvent::Error { message } => eprintln!("{}", message),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Host collaborators
pub mod renderer;
pub mod source;

// Session engine
pub mod api;
pub mod control;
pub mod controller;
pub mod decode;
pub mod pacer;
pub mod uploader;

// Core exports
pub use config::StreamConfig;
pub use error::*;
pub use types::*;

pub use api::{HttpServiceApi, ServiceApi};
pub use control::{ControlConnector, WebSocketConnector};
pub use controller::{EventStream, SessionController, SessionHandle};
pub use decode::{FrameDecoder, Raster, Rgb, Waveform, WaveformLayout};
pub use renderer::FrameRenderer;
pub use source::FrameSource;

/// Entry point wiring a controller to the real service.
///
/// Use [`SessionController::spawn`] directly to inject other [`ServiceApi`] or
/// [`ControlConnector`] implementations.
pub struct CamStream;

impl CamStream {
    /// Spawn a session controller that reaches the configured service over
    /// HTTP and its push channel over WebSocket.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] when the configured endpoints do not
    /// form valid URLs, or a transport error when the HTTP client cannot be
    /// built.
    pub fn connect<S, R>(config: &StreamConfig, source: S, renderer: R) -> Result<(SessionHandle, EventStream)>
    where
        S: FrameSource,
        R: FrameRenderer,
    {
        config.validate()?;
        let api = Arc::new(HttpServiceApi::new(config)?);
        let connector = Arc::new(WebSocketConnector::new(config)?);
        Ok(SessionController::spawn(config, api, connector, source, renderer))
    }
}
