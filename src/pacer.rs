//! Fixed-interval frame capture

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::source::FrameSource;
use crate::types::{FrameChunk, VideoGeometry};

/// What the pacer hands back to the controller.
#[derive(Debug)]
pub enum PacerReport {
    /// One captured frame for the session generation that armed the pacer
    Frame { generation: u64, chunk: FrameChunk },

    /// The source negotiated a new frame size
    Geometry(VideoGeometry),
}

enum PacerCommand {
    Arm { generation: u64, cancel: CancellationToken },
}

/// Handle to the capture task.
///
/// The task owns the [`FrameSource`] for the controller's whole lifetime and
/// only ticks while armed. Disarming cancels the pending tick immediately.
pub struct CapturePacer {
    commands: mpsc::UnboundedSender<PacerCommand>,
    armed: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl CapturePacer {
    /// Spawn the capture task for `source`.
    pub fn spawn<S>(source: S, period: Duration, reports: mpsc::UnboundedSender<PacerReport>) -> Self
    where
        S: FrameSource,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            Self::capture_task(source, period, command_rx, reports, task_shutdown).await;
        });

        Self { commands, armed: None, shutdown }
    }

    /// Start ticking on behalf of `generation`. Any previous arming is cancelled.
    pub fn arm(&mut self, generation: u64) {
        self.disarm();
        let cancel = self.shutdown.child_token();
        if self.commands.send(PacerCommand::Arm { generation, cancel: cancel.clone() }).is_ok() {
            self.armed = Some(cancel);
        }
    }

    /// Stop ticking. Idempotent.
    pub fn disarm(&mut self) {
        if let Some(cancel) = self.armed.take() {
            cancel.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    async fn capture_task<S>(
        mut source: S,
        period: Duration,
        mut commands: mpsc::UnboundedReceiver<PacerCommand>,
        reports: mpsc::UnboundedSender<PacerReport>,
        shutdown: CancellationToken,
    ) where
        S: FrameSource,
    {
        info!("Capture task started ({:?} interval)", period);
        let mut last_geometry = None;

        loop {
            let (generation, cancel) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(PacerCommand::Arm { generation, cancel }) => (generation, cancel),
                    None => break,
                },
            };

            debug!("Capture armed for session generation {}", generation);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut captured = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !source.is_ready() {
                    trace!("Frame source not ready, skipping tick");
                    continue;
                }

                let geometry = source.geometry();
                if geometry.is_some() && geometry != last_geometry {
                    last_geometry = geometry;
                    if let Some(geometry) = geometry {
                        let _ = reports.send(PacerReport::Geometry(geometry));
                    }
                }

                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    frame = source.capture_frame() => frame,
                };

                match frame {
                    Ok(Some(bytes)) => {
                        captured += 1;
                        trace!("Captured frame {} ({} bytes)", captured, bytes.len());
                        let chunk = FrameChunk::new(bytes);
                        if reports.send(PacerReport::Frame { generation, chunk }).is_err() {
                            debug!("Controller gone, stopping capture");
                            return;
                        }
                    }
                    Ok(None) => trace!("No frame available this tick"),
                    Err(e) => debug!("Frame capture failed, skipping tick: {}", e),
                }
            }

            debug!("Capture disarmed after {} frames", captured);
        }

        info!("Capture task ended");
    }
}

impl Drop for CapturePacer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticSource;

    fn drain(rx: &mut mpsc::UnboundedReceiver<PacerReport>) -> Vec<PacerReport> {
        let mut reports = Vec::new();
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        reports
    }

    fn frames(reports: &[PacerReport]) -> usize {
        reports.iter().filter(|r| matches!(r, PacerReport::Frame { .. })).count()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval_while_armed() {
        let source = SyntheticSource::new(VideoGeometry::new(4, 2));
        let captures = source.capture_counter();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pacer = CapturePacer::spawn(source, Duration::from_millis(200), tx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx).is_empty(), "no ticks before arming");

        pacer.arm(7);
        // first tick is immediate, then one per 200ms: t=0, 200, 400, 600
        tokio::time::sleep(Duration::from_millis(690)).await;
        let reports = drain(&mut rx);
        assert_eq!(frames(&reports), 4);
        assert!(reports.iter().all(|r| match r {
            PacerReport::Frame { generation, chunk } => *generation == 7 && chunk.len() == 12,
            PacerReport::Geometry(g) => *g == VideoGeometry::new(4, 2),
        }));

        pacer.disarm();
        let before = captures.load(std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(captures.load(std::sync::atomic::Ordering::SeqCst), before);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unready_source_skips_ticks_without_queueing() {
        let source = SyntheticSource::new(VideoGeometry::new(2, 2));
        let ready = source.ready_flag();
        ready.store(false, std::sync::atomic::Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pacer = CapturePacer::spawn(source, Duration::from_millis(200), tx);

        pacer.arm(1);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(drain(&mut rx).is_empty());

        ready.store(true, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        let reports = drain(&mut rx);
        // only the ticks after readiness produce frames; skipped ones are not replayed
        assert!((1..=2).contains(&frames(&reports)), "{reports:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn geometry_is_reported_once_per_change() {
        let source = SyntheticSource::new(VideoGeometry::new(4, 2));
        let geometry = source.geometry_handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pacer = CapturePacer::spawn(source, Duration::from_millis(100), tx);

        pacer.arm(1);
        tokio::time::sleep(Duration::from_millis(350)).await;
        *geometry.lock().unwrap() = Some(VideoGeometry::new(8, 4));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let sizes: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|r| match r {
                PacerReport::Geometry(g) => Some(g),
                PacerReport::Frame { .. } => None,
            })
            .collect();
        assert_eq!(sizes, vec![VideoGeometry::new(4, 2), VideoGeometry::new(8, 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_switches_generation() {
        let source = SyntheticSource::new(VideoGeometry::new(2, 2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pacer = CapturePacer::spawn(source, Duration::from_millis(200), tx);

        pacer.arm(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        pacer.arm(2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(400)).await;
        for report in drain(&mut rx) {
            if let PacerReport::Frame { generation, .. } = report {
                assert_eq!(generation, 2);
            }
        }
        assert!(pacer.is_armed());
    }
}
