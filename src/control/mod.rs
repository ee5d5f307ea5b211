//! Push channel delivering processed frames from the service.
//!
//! The service speaks Socket.IO over a WebSocket. [`ControlChannel`] keeps one
//! subscription alive per session and redoes the join/subscribe handshake
//! after every reconnection.

mod channel;
mod packet;
mod transport;

pub use channel::{
    ControlChannel, ControlEvent, ControlNotice, ERROR, JOIN_STREAM, JOINED_STREAM, PROCESSED_CHUNK,
    PROCESSED_STREAM_STARTED, REQUEST_PROCESSED_STREAM, ReconnectPolicy, STREAM_STOPPED,
};
pub use packet::{OpenInfo, Packet};
pub use transport::{ControlConnector, ControlTransport, WebSocketConnector};
