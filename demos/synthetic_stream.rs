//! Stream a synthetic camera to the processing service.
//!
//! Reads its configuration from the YAML file named by `CAMSTREAM_CONFIG`
//! (defaults apply when unset), streams for `CAMSTREAM_SECONDS` seconds
//! (default 10) and logs every session event. Set `RUST_LOG=camstream=debug`
//! for engine internals.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use camstream::{
    CamStream, FrameRenderer, FrameSource, HttpServiceApi, Raster, ServiceApi, SessionEvent, StreamConfig,
    VideoGeometry, Waveform,
};
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Moving diagonal bands, so successive frames differ.
struct TestPattern {
    geometry: VideoGeometry,
    frame: u32,
}

#[async_trait]
impl FrameSource for TestPattern {
    fn is_ready(&self) -> bool {
        true
    }

    fn geometry(&self) -> Option<VideoGeometry> {
        Some(self.geometry)
    }

    async fn capture_frame(&mut self) -> camstream::Result<Option<Bytes>> {
        let VideoGeometry { width, height } = self.geometry;
        let mut data = Vec::with_capacity(self.geometry.frame_len());
        for y in 0..height {
            for x in 0..width {
                data.push(((x + y + self.frame * 4) % 256) as u8);
            }
        }
        data.resize(self.geometry.frame_len(), 128);
        self.frame += 1;
        Ok(Some(Bytes::from(data)))
    }
}

/// Logs what a display would show.
struct LogScreen;

impl FrameRenderer for LogScreen {
    fn present_raster(&mut self, raster: &Raster) {
        let centre = raster.pixel(raster.width() / 2, raster.height() / 2);
        info!("Processed frame {}x{}, centre pixel {:?}", raster.width(), raster.height(), centre);
    }

    fn present_fallback(&mut self, waveform: &Waveform) {
        info!("Undecodable payload of {} bytes ({} samples)", waveform.byte_len, waveform.samples.len());
    }

    fn clear(&mut self) {
        info!("Display cleared");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("CAMSTREAM_CONFIG") {
        Ok(path) => StreamConfig::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => StreamConfig::default(),
    };
    let seconds: u64 = std::env::var("CAMSTREAM_SECONDS").ok().and_then(|s| s.parse().ok()).unwrap_or(10);
    info!("Service at {}", config.server.base_url());

    let api = HttpServiceApi::new(&config)?;
    match api.list_streams().await {
        Ok(list) => info!("Service knows {} stream(s)", list.total),
        Err(e) => warn!("Could not list streams: {}", e),
    }

    let geometry = VideoGeometry::best_fit(
        &[VideoGeometry::new(1920, 1080), VideoGeometry::new(640, 480), VideoGeometry::new(320, 240)],
        config.capture.max_geometry(),
    )
    .context("no capture geometry available")?;
    info!("Capturing at {}", geometry);

    let source = TestPattern { geometry, frame: 0 };
    let (session, mut events) = CamStream::connect(&config, source, LogScreen)?;
    session.start("synthetic-camera").await?;

    let mut uploaded = 0u64;
    let mut failed = 0u64;
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(SessionEvent::Started { session_id }) => info!("Streaming as {}", session_id),
                Some(SessionEvent::ChunkResult { success: true }) => uploaded += 1,
                Some(SessionEvent::ChunkResult { success: false }) => failed += 1,
                Some(SessionEvent::ProcessedFrame(chunk)) => {
                    info!("Processed chunk: {} bytes, service time {:?}", chunk.len(), chunk.timestamp_ms());
                }
                Some(SessionEvent::Error { message }) => warn!("{}", message),
                Some(SessionEvent::Stopped) | None => break,
            },
        }
    }

    info!("Uploaded {} chunks ({} failed)", uploaded, failed);
    if session.stop().await.is_ok() {
        while let Some(event) = events.next().await {
            if event == SessionEvent::Stopped {
                info!("Session stopped");
                break;
            }
        }
    }
    Ok(())
}
