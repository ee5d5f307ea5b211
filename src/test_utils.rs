//! Synthetic frames and scripted collaborators for tests and benchmarks.
//!
//! Everything here runs in-process: [`ScriptedApi`] stands in for the REST
//! service, [`MemoryConnector`] for its Socket.IO endpoint, [`SyntheticSource`]
//! for the camera and [`RecordingRenderer`] for the display.

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, mpsc};

use crate::api::{AckResponse, ServiceApi, StartSessionResponse, StreamInfo, StreamList};
use crate::control::{
    ControlConnector, ControlTransport, JOIN_STREAM, JOINED_STREAM, OpenInfo, PROCESSED_STREAM_STARTED, Packet,
    REQUEST_PROCESSED_STREAM,
};
use crate::decode::{Raster, Rgb, Waveform};
use crate::renderer::FrameRenderer;
use crate::source::FrameSource;
use crate::types::VideoGeometry;
use crate::{Result, StreamError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A 4:2:0 semi-planar frame with the same luma everywhere and one chroma
/// pair (`u` first, then `v`) repeated over the chroma plane.
pub fn uniform_frame(geometry: VideoGeometry, y: u8, u: u8, v: u8) -> Vec<u8> {
    let luma = geometry.pixel_count();
    let mut frame = vec![y; luma];
    frame.extend(std::iter::repeat_n([u, v], (geometry.frame_len() - luma) / 2).flatten());
    frame.resize(geometry.frame_len(), 128);
    frame
}

/// A frame with a horizontal luma ramp and varying chroma, so every pixel
/// takes a different path through the colour conversion.
pub fn pattern_frame(geometry: VideoGeometry) -> Vec<u8> {
    let width = geometry.width.max(1) as usize;
    (0..geometry.frame_len())
        .map(|i| {
            if i < geometry.pixel_count() {
                ((i % width) * 255 / width) as u8
            } else {
                (i * 37 % 256) as u8
            }
        })
        .collect()
}

/// One request observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Start(String),
    Upload { session_id: String, bytes: usize },
    Stop(String),
    List,
}

#[derive(Debug)]
struct Script {
    start_reply: StartSessionResponse,
    upload_failure: Option<String>,
    stop_failure: Option<String>,
    transport_broken: bool,
    hold_starts: bool,
    hold_uploads: bool,
}

/// In-memory [`ServiceApi`] with scripted replies.
///
/// Starts and uploads can be held at the service until released, which lets
/// tests interleave completions with local state changes.
pub struct ScriptedApi {
    script: Mutex<Script>,
    calls: Mutex<Vec<ApiCall>>,
    start_gate: Semaphore,
    upload_gate: Semaphore,
}

impl ScriptedApi {
    /// Accepts every start with `session_id`.
    pub fn accepting(session_id: &str) -> Self {
        Self::with_start_reply(StartSessionResponse {
            success: true,
            session_id: Some(session_id.to_string()),
            message: "Stream started".to_string(),
            websocket_url: None,
        })
    }

    /// Refuses every start with `message`.
    pub fn rejecting(message: &str) -> Self {
        Self::with_start_reply(StartSessionResponse {
            success: false,
            session_id: None,
            message: message.to_string(),
            websocket_url: None,
        })
    }

    fn with_start_reply(start_reply: StartSessionResponse) -> Self {
        Self {
            script: Mutex::new(Script {
                start_reply,
                upload_failure: None,
                stop_failure: None,
                transport_broken: false,
                hold_starts: false,
                hold_uploads: false,
            }),
            calls: Mutex::new(Vec::new()),
            start_gate: Semaphore::new(0),
            upload_gate: Semaphore::new(0),
        }
    }

    pub fn fail_uploads_with(&self, message: &str) {
        lock(&self.script).upload_failure = Some(message.to_string());
    }

    pub fn accept_uploads(&self) {
        lock(&self.script).upload_failure = None;
    }

    pub fn fail_stops_with(&self, message: &str) {
        lock(&self.script).stop_failure = Some(message.to_string());
    }

    /// Every later request fails as if the service were unreachable.
    pub fn break_transport(&self) {
        lock(&self.script).transport_broken = true;
    }

    pub fn repair_transport(&self) {
        lock(&self.script).transport_broken = false;
    }

    pub fn hold_starts(&self) {
        lock(&self.script).hold_starts = true;
    }

    /// Let one held start complete.
    pub fn release_start(&self) {
        self.start_gate.add_permits(1);
    }

    pub fn hold_uploads(&self) {
        lock(&self.script).hold_uploads = true;
    }

    /// Let `count` held uploads complete.
    pub fn release_uploads(&self, count: usize) {
        self.upload_gate.add_permits(count);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: ApiCall) -> Result<()> {
        lock(&self.calls).push(call);
        if lock(&self.script).transport_broken {
            return Err(StreamError::transport("connection refused"));
        }
        Ok(())
    }

    async fn pass(gate: &Semaphore) {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl ServiceApi for ScriptedApi {
    async fn start_session(&self, device_id: &str) -> Result<StartSessionResponse> {
        lock(&self.calls).push(ApiCall::Start(device_id.to_string()));
        let held = lock(&self.script).hold_starts;
        if held {
            Self::pass(&self.start_gate).await;
        }
        let script = lock(&self.script);
        if script.transport_broken {
            return Err(StreamError::transport("connection refused"));
        }
        Ok(script.start_reply.clone())
    }

    async fn upload_chunk(&self, session_id: &str, payload: Bytes) -> Result<AckResponse> {
        lock(&self.calls).push(ApiCall::Upload { session_id: session_id.to_string(), bytes: payload.len() });
        let held = lock(&self.script).hold_uploads;
        if held {
            Self::pass(&self.upload_gate).await;
        }
        let script = lock(&self.script);
        if script.transport_broken {
            return Err(StreamError::transport("connection refused"));
        }
        Ok(match &script.upload_failure {
            Some(message) => AckResponse::rejected(message.clone()),
            None => AckResponse::ok("Chunk received"),
        })
    }

    async fn stop_session(&self, session_id: &str) -> Result<AckResponse> {
        self.record(ApiCall::Stop(session_id.to_string()))?;
        Ok(match &lock(&self.script).stop_failure {
            Some(message) => AckResponse::rejected(message.clone()),
            None => AckResponse::ok("Stream stopped"),
        })
    }

    async fn list_streams(&self) -> Result<StreamList> {
        self.record(ApiCall::List)?;
        let streams = lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ApiCall::Start(device_id) => Some(device_id.clone()),
                _ => None,
            })
            .enumerate()
            .map(|(i, device_id)| StreamInfo {
                stream_id: format!("scripted-{}", i + 1),
                device_id,
                is_active: true,
                created_at: "1970-01-01T00:00:00".to_string(),
                clients_count: 1,
                buffer_size: 0,
            })
            .collect::<Vec<_>>();
        Ok(StreamList { success: true, total: streams.len() as u32, streams, message: String::new() })
    }
}

/// Camera stand-in producing uniform frames at its current geometry.
pub struct SyntheticSource {
    geometry: Arc<Mutex<Option<VideoGeometry>>>,
    ready: Arc<AtomicBool>,
    captures: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(geometry: VideoGeometry) -> Self {
        Self {
            geometry: Arc::new(Mutex::new(Some(geometry))),
            ready: Arc::new(AtomicBool::new(true)),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of frames captured so far.
    pub fn capture_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.captures)
    }

    /// Readiness switch; an unready source makes the pacer skip ticks.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    /// Negotiated geometry; replace it to simulate renegotiation.
    pub fn geometry_handle(&self) -> Arc<Mutex<Option<VideoGeometry>>> {
        Arc::clone(&self.geometry)
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn geometry(&self) -> Option<VideoGeometry> {
        *lock(&self.geometry)
    }

    async fn capture_frame(&mut self) -> Result<Option<Bytes>> {
        let Some(geometry) = self.geometry() else {
            return Ok(None);
        };
        let count = self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Bytes::from(uniform_frame(geometry, (count % 256) as u8, 128, 128))))
    }
}

/// What a [`RecordingRenderer`] was asked to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Presented {
    Raster { geometry: VideoGeometry, first_pixel: Option<Rgb> },
    Fallback { samples: usize, byte_len: usize },
    Clear,
}

/// Renderer that records every call; clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<Vec<Presented>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> Vec<Presented> {
        lock(&self.log).clone()
    }
}

impl FrameRenderer for RecordingRenderer {
    fn present_raster(&mut self, raster: &Raster) {
        lock(&self.log).push(Presented::Raster { geometry: raster.geometry(), first_pixel: raster.pixel(0, 0) });
    }

    fn present_fallback(&mut self, waveform: &Waveform) {
        lock(&self.log)
            .push(Presented::Fallback { samples: waveform.samples.len(), byte_len: waveform.byte_len });
    }

    fn clear(&mut self) {
        lock(&self.log).push(Presented::Clear);
    }
}

#[derive(Debug, Default)]
struct MemoryServer {
    connections: usize,
    refuse: bool,
    silent: bool,
    client_packets: Vec<Packet>,
    push: Option<mpsc::UnboundedSender<String>>,
}

/// In-memory Socket.IO endpoint.
///
/// Each connection opens with an Engine.IO handshake and acknowledges the
/// namespace connect, `join_stream` and `request_processed_stream` the way the
/// service does. Tests push further events and drop connections at will.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    server: Arc<Mutex<MemoryServer>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        lock(&self.server).connections
    }

    /// Refuse all later connection attempts.
    pub fn refuse_connections(&self) {
        lock(&self.server).refuse = true;
    }

    pub fn accept_connections(&self) {
        lock(&self.server).refuse = false;
    }

    /// Stop acknowledging client events (the handshake stalls after connect).
    pub fn go_silent(&self) {
        lock(&self.server).silent = true;
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) {
        lock(&self.server).push = None;
    }

    /// Send an event on the current connection. Returns false when nothing is connected.
    pub fn push_event(&self, name: &str, data: Value) -> bool {
        self.push_packet(Packet::event(name, data))
    }

    pub fn push_packet(&self, packet: Packet) -> bool {
        match &lock(&self.server).push {
            Some(push) => push.send(packet.encode()).is_ok(),
            None => false,
        }
    }

    /// Every packet the client sent, across connections.
    pub fn client_packets(&self) -> Vec<Packet> {
        lock(&self.server).client_packets.clone()
    }

    /// Client events as `(name, data)`, across connections.
    pub fn client_events(&self) -> Vec<(String, Value)> {
        self.client_packets()
            .into_iter()
            .filter_map(|packet| match packet {
                Packet::Event { name, data } => Some((name, data)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ControlConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn ControlTransport>> {
        let mut server = lock(&self.server);
        if server.refuse {
            return Err(StreamError::transport("connection refused"));
        }
        server.connections += 1;
        let connection = server.connections;

        let (push, incoming) = mpsc::unbounded_channel();
        let open = OpenInfo {
            sid: format!("mem-{}", connection),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: None,
        };
        let _ = push.send(Packet::Open(open).encode());
        server.push = Some(push);

        Ok(Box::new(MemoryTransport { server: Arc::clone(&self.server), connection, incoming }))
    }
}

struct MemoryTransport {
    server: Arc<Mutex<MemoryServer>>,
    connection: usize,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    fn reply_to(packet: &Packet) -> Option<Packet> {
        match packet {
            Packet::Connect(_) => Some(Packet::Connect(Some(json!({ "sid": "namespace" })))),
            Packet::Event { name, data } if name == JOIN_STREAM => Some(Packet::event(JOINED_STREAM, data.clone())),
            Packet::Event { name, data } if name == REQUEST_PROCESSED_STREAM => {
                Some(Packet::event(PROCESSED_STREAM_STARTED, data.clone()))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ControlTransport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let packet = Packet::parse(&text)?;
        let mut server = lock(&self.server);
        server.client_packets.push(packet.clone());

        if server.connections != self.connection {
            return Err(StreamError::transport("connection closed"));
        }
        let Some(push) = server.push.as_ref() else {
            return Err(StreamError::transport("connection closed"));
        };
        if !server.silent {
            if let Some(reply) = Self::reply_to(&packet) {
                let _ = push.send(reply.encode());
            }
        }
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        Ok(self.incoming.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        let mut server = lock(&self.server);
        if server.connections == self.connection {
            server.push = None;
        }
        Ok(())
    }
}
