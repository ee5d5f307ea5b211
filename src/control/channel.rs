//! Push subscription for one session.
//!
//! The channel connects, joins the session's room, then subscribes to its
//! processed frames. Every reconnection repeats the whole handshake, so a
//! subscription survives transient network loss without help from the
//! controller.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::packet::Packet;
use super::transport::{ControlConnector, ControlTransport};
use crate::config::ControlConfig;
use crate::types::ProcessedChunk;
use crate::{Result, StreamError};

/// Client to service: join the session's room.
pub const JOIN_STREAM: &str = "join_stream";
/// Service to client: room joined.
pub const JOINED_STREAM: &str = "joined_stream";
/// Client to service: start pushing processed frames.
pub const REQUEST_PROCESSED_STREAM: &str = "request_processed_stream";
/// Service to client: processed frames will follow.
pub const PROCESSED_STREAM_STARTED: &str = "processed_stream_started";
/// Service to client: one processed frame, base64 in `data`.
pub const PROCESSED_CHUNK: &str = "processed_chunk";
/// Service to client: the session ended on the service side.
pub const STREAM_STOPPED: &str = "stream_stopped";
/// Service to client: `{message}`.
pub const ERROR: &str = "error";

/// Time allowed for the Engine.IO open packet after connecting.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(1);

/// What the channel reports to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Namespace connected; join request sent
    Connected,
    /// Room joined; subscription request sent
    Joined,
    /// The service confirmed the processed-frame subscription
    Subscribed,
    ProcessedChunk(ProcessedChunk),
    /// `error` event from the service; the session keeps running
    ServerError(String),
    /// Connection dropped; a reconnection follows after `retry_in`
    Interrupted { reason: String, retry_in: Duration },
    /// Reconnection is disabled or exhausted; the channel has stopped
    ConnectionLost(String),
}

/// A [`ControlEvent`] tagged with the session generation that opened the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlNotice {
    pub generation: u64,
    pub event: ControlEvent,
}

/// Reconnection schedule with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Consecutive failed attempts allowed; `None` is unbounded
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ControlConfig) -> Self {
        Self {
            enabled: config.reconnection,
            max_attempts: config.reconnection_attempts,
            delay: Duration::from_millis(config.reconnection_delay_ms),
            max_delay: Duration::from_millis(config.reconnection_delay_max_ms),
        }
    }

    /// Delay before reconnection `attempt` (1-based), or `None` when exhausted.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        Some(self.delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ControlConfig::default())
    }
}

/// Why a connection ended.
enum Ended {
    Cancelled,
    Lost(String),
}

type Step<T> = std::result::Result<T, Ended>;

/// Handle to the push subscription of one session.
///
/// Dropping the handle disconnects.
pub struct ControlChannel {
    session_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ControlChannel {
    /// Connect and subscribe to `session_id`'s processed frames.
    pub fn open(
        connector: Arc<dyn ControlConnector>,
        session_id: impl Into<String>,
        generation: u64,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<ControlNotice>,
    ) -> Self {
        let session_id = session_id.into();
        let cancel = CancellationToken::new();
        let worker = Worker {
            connector,
            session_id: session_id.clone(),
            generation,
            policy,
            events,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());
        Self { session_id, cancel, task: Some(task) }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Leave the subscription. Idempotent; safe before the first connection.
    pub fn disconnect(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("Disconnecting control channel for {}", self.session_id);
            self.cancel.cancel();
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the channel task to finish.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    connector: Arc<dyn ControlConnector>,
    session_id: String,
    generation: u64,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<ControlNotice>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        info!("Control channel started for session {}", self.session_id);
        let mut failures = 0u32;

        loop {
            let mut connected = false;
            let reason = match self.connect_once(&mut connected).await {
                Ended::Cancelled => break,
                Ended::Lost(reason) => reason,
            };
            if connected {
                failures = 0;
            }
            failures += 1;

            let Some(delay) = self.policy.backoff(failures) else {
                warn!("Control channel lost for {}: {}", self.session_id, reason);
                self.notify(ControlEvent::ConnectionLost(reason));
                break;
            };

            debug!("Control channel interrupted ({}), retry {} in {:?}", reason, failures, delay);
            if !self.notify(ControlEvent::Interrupted { reason, retry_in: delay }) {
                break;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Control channel ended for session {}", self.session_id);
    }

    async fn connect_once(&self, connected: &mut bool) -> Ended {
        let transport = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ended::Cancelled,
            transport = self.connector.connect() => transport,
        };
        let mut transport = match transport {
            Ok(transport) => transport,
            Err(e) => return Ended::Lost(e.to_string()),
        };

        let ended = match self.serve(transport.as_mut(), connected).await {
            Ok(never) => match never {},
            Err(ended) => ended,
        };

        if matches!(ended, Ended::Cancelled) {
            // best effort; the peer may already be gone
            let goodbye = async {
                let _ = transport.send_text(Packet::Disconnect.encode()).await;
                let _ = transport.close().await;
            };
            let _ = tokio::time::timeout(GOODBYE_TIMEOUT, goodbye).await;
        }
        ended
    }

    async fn serve(
        &self,
        transport: &mut dyn ControlTransport,
        connected: &mut bool,
    ) -> Step<std::convert::Infallible> {
        let open = match self.next_packet(transport, HANDSHAKE_TIMEOUT).await? {
            Packet::Open(open) => open,
            other => return Err(Ended::Lost(format!("expected open packet, got {:?}", other))),
        };
        trace!("Engine.IO session {} (ping every {}ms)", open.sid, open.ping_interval);
        let liveness = Duration::from_millis(open.ping_interval + open.ping_timeout);
        self.send(transport, Packet::Connect(None)).await?;

        loop {
            match self.next_packet(transport, liveness).await? {
                Packet::Ping => self.send(transport, Packet::Pong).await?,
                Packet::Connect(_) => {
                    *connected = true;
                    debug!("Control channel connected, joining {}", self.session_id);
                    self.emit(ControlEvent::Connected)?;
                    let join = Packet::event(JOIN_STREAM, json!({ "stream_id": self.session_id }));
                    self.send(transport, join).await?;
                }
                Packet::Event { name, data } => self.on_event(transport, &name, data).await?,
                Packet::ConnectError(data) => {
                    return Err(Ended::Lost(format!("namespace connection refused: {}", data)));
                }
                Packet::Disconnect | Packet::Close => {
                    return Err(Ended::Lost("service closed the connection".to_string()));
                }
                Packet::Pong | Packet::Noop | Packet::Ack | Packet::Open(_) => {}
            }
        }
    }

    async fn on_event(&self, transport: &mut dyn ControlTransport, name: &str, data: Value) -> Step<()> {
        match name {
            JOINED_STREAM => {
                debug!("Joined stream {}, requesting processed frames", self.session_id);
                self.emit(ControlEvent::Joined)?;
                let request = Packet::event(REQUEST_PROCESSED_STREAM, json!({ "stream_id": self.session_id }));
                self.send(transport, request).await?;
            }
            PROCESSED_STREAM_STARTED => {
                info!("Processed stream started for {}", self.session_id);
                self.emit(ControlEvent::Subscribed)?;
            }
            PROCESSED_CHUNK => match decode_chunk(&data) {
                Ok(chunk) => {
                    trace!("Processed chunk ({} bytes)", chunk.len());
                    self.emit(ControlEvent::ProcessedChunk(chunk))?;
                }
                Err(e) => warn!("Dropping processed chunk: {}", e),
            },
            STREAM_STOPPED => info!("Service reports stream {} stopped", self.session_id),
            ERROR => {
                let message = match data.get("message").and_then(Value::as_str) {
                    Some(message) => message.to_string(),
                    None => data.to_string(),
                };
                warn!("Service error on control channel: {}", message);
                self.emit(ControlEvent::ServerError(message))?;
            }
            other => trace!("Ignoring control event '{}'", other),
        }
        Ok(())
    }

    async fn next_packet(&self, transport: &mut dyn ControlTransport, wait: Duration) -> Step<Packet> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Ended::Cancelled),
                received = tokio::time::timeout(wait, transport.next_text()) => received,
            };
            let text = match received {
                Err(_) => return Err(Ended::Lost(format!("no packet within {:?}", wait))),
                Ok(Err(e)) => return Err(Ended::Lost(e.to_string())),
                Ok(Ok(None)) => return Err(Ended::Lost("connection closed".to_string())),
                Ok(Ok(Some(text))) => text,
            };
            match Packet::parse(&text) {
                Ok(packet) => return Ok(packet),
                Err(e) => warn!("Skipping unreadable control packet: {}", e),
            }
        }
    }

    async fn send(&self, transport: &mut dyn ControlTransport, packet: Packet) -> Step<()> {
        transport.send_text(packet.encode()).await.map_err(|e| Ended::Lost(e.to_string()))
    }

    /// Forward `event`; false once the controller is gone.
    fn notify(&self, event: ControlEvent) -> bool {
        self.events.send(ControlNotice { generation: self.generation, event }).is_ok()
    }

    fn emit(&self, event: ControlEvent) -> Step<()> {
        if self.notify(event) { Ok(()) } else { Err(Ended::Cancelled) }
    }
}

fn decode_chunk(data: &Value) -> Result<ProcessedChunk> {
    let encoded = data
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| StreamError::decode("processed chunk without a data field"))?;
    Ok(ProcessedChunk::new(STANDARD.decode(encoded)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryConnector;

    fn policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            max_attempts,
            delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ControlNotice>) -> ControlEvent {
        let notice = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("control event in time")
            .expect("channel open");
        notice.event
    }

    async fn until_subscribed(rx: &mut mpsc::UnboundedReceiver<ControlNotice>) -> Vec<ControlEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(rx).await;
            let done = event == ControlEvent::Subscribed;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[test]
    fn chunk_payloads_decode_or_report_why_not() {
        let chunk = decode_chunk(&json!({"data": STANDARD.encode([1u8, 2, 3]), "size": 3})).unwrap();
        assert_eq!(chunk.len(), 3);

        let invalid = decode_chunk(&json!({"data": "not base64!"})).unwrap_err();
        assert!(matches!(invalid, StreamError::Decode { .. }));
        assert!(invalid.to_string().contains("base64"));

        let missing = decode_chunk(&json!({"size": 3})).unwrap_err();
        assert!(matches!(missing, StreamError::Decode { .. }));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = policy(Some(5));
        let delays: Vec<_> = (1..=6).map(|n| policy.backoff(n)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(400)),
                Some(Duration::from_millis(400)),
                Some(Duration::from_millis(400)),
                None,
            ]
        );
        assert_eq!(policy.backoff(u32::MAX), None);
        assert_eq!(ReconnectPolicy { enabled: false, ..policy }.backoff(1), None);
        assert_eq!(self::policy(None).backoff(1000), Some(Duration::from_millis(400)));
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_joins_then_subscribes() {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = ControlChannel::open(connector.clone(), "s-9", 4, policy(None), tx);

        let events = until_subscribed(&mut rx).await;
        assert_eq!(events, vec![ControlEvent::Connected, ControlEvent::Joined, ControlEvent::Subscribed]);

        let events = connector.client_events();
        assert_eq!(
            events,
            vec![
                (JOIN_STREAM.to_string(), json!({"stream_id": "s-9"})),
                (REQUEST_PROCESSED_STREAM.to_string(), json!({"stream_id": "s-9"})),
            ]
        );

        channel.disconnect();
        channel.closed().await;
        assert!(connector.client_packets().contains(&Packet::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn processed_chunks_are_decoded_and_tagged() {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _channel = ControlChannel::open(connector.clone(), "s-1", 11, policy(None), tx);
        until_subscribed(&mut rx).await;

        connector.push_event(PROCESSED_CHUNK, json!({"data": "not base64!", "size": 3}));
        connector.push_event(PROCESSED_CHUNK, json!({"data": STANDARD.encode([1u8, 2, 3]), "size": 3}));

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.generation, 11);
        assert_eq!(notice.event, ControlEvent::ProcessedChunk(ProcessedChunk::new(vec![1u8, 2, 3])));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_forwarded_without_disconnecting() {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = ControlChannel::open(connector.clone(), "s-1", 1, policy(None), tx);
        until_subscribed(&mut rx).await;

        connector.push_event(ERROR, json!({"message": "model overloaded"}));
        assert_eq!(next_event(&mut rx).await, ControlEvent::ServerError("model overloaded".into()));

        connector.push_event(PROCESSED_CHUNK, json!({"data": "AA=="}));
        assert!(matches!(next_event(&mut rx).await, ControlEvent::ProcessedChunk(_)));
        assert!(!channel.is_disconnected());
        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnection_repeats_the_full_handshake() {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _channel = ControlChannel::open(connector.clone(), "s-5", 2, policy(None), tx);
        until_subscribed(&mut rx).await;

        connector.drop_connection();
        match next_event(&mut rx).await {
            ControlEvent::Interrupted { retry_in, .. } => assert_eq!(retry_in, Duration::from_millis(100)),
            other => panic!("expected interruption, got {other:?}"),
        }
        let events = until_subscribed(&mut rx).await;
        assert_eq!(events, vec![ControlEvent::Connected, ControlEvent::Joined, ControlEvent::Subscribed]);

        assert_eq!(connector.connections(), 2);
        let joins = connector
            .client_events()
            .into_iter()
            .filter(|(name, _)| name == JOIN_STREAM)
            .count();
        let subscriptions = connector
            .client_events()
            .into_iter()
            .filter(|(name, _)| name == REQUEST_PROCESSED_STREAM)
            .count();
        assert_eq!((joins, subscriptions), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnection_reports_connection_lost() {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = ControlChannel::open(connector.clone(), "s-1", 3, policy(Some(2)), tx);
        until_subscribed(&mut rx).await;

        connector.refuse_connections();
        connector.drop_connection();

        let mut interruptions = 0;
        loop {
            match next_event(&mut rx).await {
                ControlEvent::Interrupted { .. } => interruptions += 1,
                ControlEvent::ConnectionLost(_) => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(interruptions, 2);
        channel.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_connecting_is_safe() {
        let connector = Arc::new(MemoryConnector::new());
        connector.refuse_connections();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = ControlChannel::open(connector, "s-1", 1, policy(None), tx);

        channel.disconnect();
        channel.disconnect();
        channel.closed().await;
        assert!(channel.is_disconnected());
        while let Ok(notice) = rx.try_recv() {
            assert!(matches!(notice.event, ControlEvent::Interrupted { .. }));
        }
    }
}
