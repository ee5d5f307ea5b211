//! End-to-end session through the public API.
//!
//! The service and its push channel are faked in-process; everything between
//! them (controller, pacer, uploader, push channel, decoder) is the real thing.

use async_trait::async_trait;
use bytes::Bytes;
use camstream::api::{AckResponse, StartSessionResponse, StreamList};
use camstream::control::{ControlTransport, Packet};
use camstream::{
    ControlConnector, FrameRenderer, FrameSource, Raster, Rgb, ServiceApi, SessionController, SessionEvent,
    SessionState, StreamConfig, StreamError, VideoGeometry, Waveform,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const GEOMETRY: VideoGeometry = VideoGeometry { width: 4, height: 2 };

#[derive(Default)]
struct FakeService {
    uploads: Mutex<Vec<usize>>,
    stops: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceApi for FakeService {
    async fn start_session(&self, device_id: &str) -> camstream::Result<StartSessionResponse> {
        Ok(StartSessionResponse {
            success: true,
            session_id: Some(format!("{}-stream", device_id)),
            message: "Stream started".into(),
            websocket_url: None,
        })
    }

    async fn upload_chunk(&self, _session_id: &str, payload: Bytes) -> camstream::Result<AckResponse> {
        self.uploads.lock().unwrap().push(payload.len());
        Ok(AckResponse::ok("Chunk received"))
    }

    async fn stop_session(&self, session_id: &str) -> camstream::Result<AckResponse> {
        self.stops.lock().unwrap().push(session_id.to_string());
        Err(StreamError::transport("service went away"))
    }

    async fn list_streams(&self) -> camstream::Result<StreamList> {
        Ok(StreamList::default())
    }
}

/// Socket.IO endpoint that acknowledges the handshake and then pushes one
/// timestamped mid-grey frame.
struct FakePushEndpoint;

struct FakePushConnection {
    outbox: mpsc::UnboundedSender<String>,
    inbox: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl ControlConnector for FakePushEndpoint {
    async fn connect(&self) -> camstream::Result<Box<dyn ControlTransport>> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        outbox
            .send(r#"0{"sid":"fake","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.to_string())
            .unwrap();
        Ok(Box::new(FakePushConnection { outbox, inbox }))
    }
}

#[async_trait]
impl ControlTransport for FakePushConnection {
    async fn send_text(&mut self, text: String) -> camstream::Result<()> {
        let replies = match Packet::parse(&text)? {
            Packet::Connect(_) => vec![Packet::Connect(Some(json!({"sid": "ns"})))],
            Packet::Event { name, data } if name == "join_stream" => vec![Packet::event("joined_stream", data)],
            Packet::Event { name, data } if name == "request_processed_stream" => {
                let mut frame = 1_700_000_000_000i64.to_be_bytes().to_vec();
                frame.extend(std::iter::repeat_n(128u8, GEOMETRY.frame_len()));
                vec![
                    Packet::event("processed_stream_started", data),
                    Packet::event("processed_chunk", json!({ "data": base64_encode(&frame), "size": frame.len() })),
                ]
            }
            _ => Vec::new(),
        };
        for reply in replies {
            let _ = self.outbox.send(reply.encode());
        }
        Ok(())
    }

    async fn next_text(&mut self) -> camstream::Result<Option<String>> {
        Ok(self.inbox.recv().await)
    }

    async fn close(&mut self) -> camstream::Result<()> {
        Ok(())
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(data)
}

struct Camera;

#[async_trait]
impl FrameSource for Camera {
    fn is_ready(&self) -> bool {
        true
    }

    fn geometry(&self) -> Option<VideoGeometry> {
        Some(GEOMETRY)
    }

    async fn capture_frame(&mut self) -> camstream::Result<Option<Bytes>> {
        Ok(Some(Bytes::from(vec![16u8; GEOMETRY.frame_len()])))
    }
}

#[derive(Clone, Default)]
struct Screen {
    rasters: Arc<Mutex<Vec<Vec<Rgb>>>>,
    cleared: Arc<Mutex<bool>>,
}

impl FrameRenderer for Screen {
    fn present_raster(&mut self, raster: &Raster) {
        self.rasters.lock().unwrap().push(raster.pixels().to_vec());
    }

    fn present_fallback(&mut self, waveform: &Waveform) {
        panic!("frame-shaped payload shown as waveform: {:?}", waveform);
    }

    fn clear(&mut self) {
        *self.cleared.lock().unwrap() = true;
    }
}

async fn next_matching(
    events: &mut camstream::EventStream,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.next().await.expect("controller running");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event in time")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn camera_to_screen_and_back() {
    let config = StreamConfig::from_yaml_str("capture:\n  interval_ms: 50\ndecode:\n  width: 4\n  height: 2\n")
        .expect("valid configuration");
    assert_eq!(config.decode.initial_geometry(), GEOMETRY);

    let service = Arc::new(FakeService::default());
    let screen = Screen::default();
    let (session, mut events) =
        SessionController::spawn(&config, service.clone(), Arc::new(FakePushEndpoint), Camera, screen.clone());

    session.start("dev-1").await.unwrap();
    let started = next_matching(&mut events, |e| matches!(e, SessionEvent::Started { .. })).await;
    assert_eq!(started, SessionEvent::Started { session_id: "dev-1-stream".into() });

    let processed = next_matching(&mut events, |e| matches!(e, SessionEvent::ProcessedFrame(_))).await;
    if let SessionEvent::ProcessedFrame(chunk) = processed {
        assert_eq!(chunk.len(), 8 + GEOMETRY.frame_len());
        assert_eq!(chunk.timestamp_ms(), Some(1_700_000_000_000));
    }
    {
        let rasters = screen.rasters.lock().unwrap();
        assert_eq!(rasters.len(), 1);
        assert!(rasters[0].iter().all(|p| *p == Rgb::new(128, 128, 128)));
    }

    next_matching(&mut events, |e| *e == SessionEvent::ChunkResult { success: true }).await;

    session.stop().await.unwrap();
    next_matching(&mut events, |e| *e == SessionEvent::Stopped).await;
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(*service.stops.lock().unwrap(), vec!["dev-1-stream".to_string()]);
    assert!(*screen.cleared.lock().unwrap());
    assert!(service.uploads.lock().unwrap().iter().all(|len| *len == GEOMETRY.frame_len()));
}
