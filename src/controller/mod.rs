//! Session controller: the single owner of session state.
//!
//! [`SessionController::spawn`] starts an actor task that owns the
//! [`Session`], the capture pacer, the chunk uploader, the push channel and the
//! decoder. Every state transition and every host notification happens on that
//! task. Network work runs on separate tasks and reports back through channels,
//! tagged with the session generation it was issued under, so a completion that
//! arrives after its session ended is recognised and dropped.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tracing::{debug, info, trace, warn};

use crate::api::ServiceApi;
use crate::config::StreamConfig;
use crate::control::{ControlChannel, ControlConnector, ControlEvent, ControlNotice, ReconnectPolicy};
use crate::decode::{Decoded, FrameDecoder};
use crate::pacer::{CapturePacer, PacerReport};
use crate::renderer::FrameRenderer;
use crate::source::FrameSource;
use crate::types::{FrameChunk, ProcessedChunk, Session, SessionEvent, SessionSnapshot, SessionState, VideoGeometry};
use crate::uploader::{ChunkUploader, UploadOutcome};
use crate::{Result, StreamError};


/// Host-facing stream of [`SessionEvent`]s, in the order they happened.
pub type EventStream = UnboundedReceiverStream<SessionEvent>;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start { device_id: String, reply: Reply<()> },
    Stop { reply: Reply<()> },
    SendChunk { chunk: FrameChunk, reply: Reply<u64> },
    SetGeometry { geometry: VideoGeometry, reply: Reply<()> },
    Redisplay { reply: Reply<bool> },
}

/// Completion of a start or stop request.
enum Completion {
    Started { generation: u64, result: Result<String> },
    Stopped { generation: u64, session_id: String, result: Result<()> },
}

/// Cloneable handle to a running controller.
///
/// Dropping the last handle shuts the controller down, releasing any
/// running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Request a new session for `device_id`.
    ///
    /// Returns once the request is dispatched; the outcome arrives as
    /// [`SessionEvent::Started`] or [`SessionEvent::Error`]. Fails with
    /// [`StreamError::AlreadyRunning`] while a session is starting, active or
    /// stopping, without contacting the service.
    pub async fn start(&self, device_id: impl Into<String>) -> Result<()> {
        let device_id = device_id.into();
        self.request(|reply| Command::Start { device_id, reply }).await
    }

    /// Stop the active session.
    ///
    /// Capture, uploads and the push channel are released before this returns;
    /// [`SessionEvent::Stopped`] follows once the service answered (or failed
    /// to). Fails with [`StreamError::NotActive`] when no session is active.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Upload one frame outside the capture schedule. Returns its sequence number.
    pub async fn send_chunk(&self, payload: impl Into<bytes::Bytes>) -> Result<u64> {
        let chunk = FrameChunk::new(payload);
        self.request(|reply| Command::SendChunk { chunk, reply }).await
    }

    /// Set the frame size used to decode processed frames.
    ///
    /// Fails with [`StreamError::Config`] when `geometry` exceeds the
    /// configured capture maximum; the current geometry is kept.
    pub async fn set_geometry(&self, geometry: VideoGeometry) -> Result<()> {
        self.request(|reply| Command::SetGeometry { geometry, reply }).await
    }

    /// Render the last processed frame again (after a geometry change or a
    /// surface reset). Returns false when no frame has arrived yet.
    pub async fn redisplay(&self) -> Result<bool> {
        self.request(|reply| Command::Redisplay { reply }).await
    }

    pub fn state(&self) -> SessionState {
        self.snapshots.borrow().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Server-issued id of the active session.
    pub fn session_id(&self) -> Option<String> {
        self.snapshots.borrow().session_id.clone()
    }

    /// Current snapshot followed by every later change.
    pub fn state_updates(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).map_err(|_| StreamError::ControllerClosed)?;
        response.await.map_err(|_| StreamError::ControllerClosed)?
    }
}

/// Spawns the controller actor.
pub struct SessionController;

impl SessionController {
    /// Start a controller that captures from `source` and renders into
    /// `renderer`.
    ///
    /// The service client and the push-channel connector are injected so the
    /// host decides how to reach the service.
    pub fn spawn<S, R>(
        config: &StreamConfig,
        api: Arc<dyn ServiceApi>,
        connector: Arc<dyn ControlConnector>,
        source: S,
        renderer: R,
    ) -> (SessionHandle, EventStream)
    where
        S: FrameSource,
        R: FrameRenderer,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (outcomes, outcome_rx) = mpsc::unbounded_channel();
        let (reports, report_rx) = mpsc::unbounded_channel();
        let (notices, notice_rx) = mpsc::unbounded_channel();

        let session = Session::new();
        let (snapshots, snapshot_rx) = watch::channel(SessionSnapshot::from(&session));

        let actor = Actor {
            session,
            api: Arc::clone(&api),
            connector,
            policy: ReconnectPolicy::from_config(&config.control),
            pacer: CapturePacer::spawn(source, config.capture.interval(), reports),
            uploader: ChunkUploader::new(api, outcomes),
            channel: None,
            decoder: FrameDecoder::new(config.decode.initial_geometry(), config.decode.timestamp_prefix),
            max_geometry: config.capture.max_geometry(),
            renderer,
            events,
            snapshots,
            completions,
            notices,
        };

        tokio::spawn(actor.run(Inbox {
            commands: command_rx,
            completions: completion_rx,
            outcomes: outcome_rx,
            reports: report_rx,
            notices: notice_rx,
        }));

        let handle = SessionHandle { commands, snapshots: snapshot_rx };
        (handle, UnboundedReceiverStream::new(event_rx))
    }
}

struct Inbox {
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    outcomes: mpsc::UnboundedReceiver<UploadOutcome>,
    reports: mpsc::UnboundedReceiver<PacerReport>,
    notices: mpsc::UnboundedReceiver<ControlNotice>,
}

struct Actor<R> {
    session: Session,
    api: Arc<dyn ServiceApi>,
    connector: Arc<dyn ControlConnector>,
    policy: ReconnectPolicy,
    pacer: CapturePacer,
    uploader: ChunkUploader,
    channel: Option<ControlChannel>,
    decoder: FrameDecoder,
    max_geometry: VideoGeometry,
    renderer: R,
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    completions: mpsc::UnboundedSender<Completion>,
    notices: mpsc::UnboundedSender<ControlNotice>,
}

impl<R: FrameRenderer> Actor<R> {
    async fn run(mut self, mut inbox: Inbox) {
        info!("Session controller started");

        loop {
            tokio::select! {
                command = inbox.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(completion) = inbox.completions.recv() => self.on_completion(completion),
                Some(outcome) = inbox.outcomes.recv() => self.on_upload(outcome),
                Some(report) = inbox.reports.recv() => self.on_capture(report),
                Some(notice) = inbox.notices.recv() => self.on_control(notice),
            }
        }

        self.shutdown();
        info!("Session controller stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start { device_id, reply } => {
                let _ = reply.send(self.start(device_id));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::SendChunk { chunk, reply } => {
                let len = chunk.len();
                let result = self.upload(self.session.generation(), chunk);
                if result.is_err() {
                    warn!("Dropping {} byte chunk: no active session", len);
                }
                let _ = reply.send(result);
            }
            Command::SetGeometry { geometry, reply } => {
                let _ = reply.send(self.resize(geometry).map(|_| ()));
            }
            Command::Redisplay { reply } => {
                let _ = reply.send(Ok(self.redisplay()));
            }
        }
    }

    fn start(&mut self, device_id: String) -> Result<()> {
        let Some(generation) = self.session.begin_start(device_id.clone()) else {
            warn!("Ignoring start for {}: session is {}", device_id, self.session.state());
            return Err(StreamError::AlreadyRunning);
        };
        info!("Starting session for device {}", device_id);
        self.publish();

        let api = Arc::clone(&self.api);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = match api.start_session(&device_id).await {
                Ok(response) => response.into_session_id(),
                Err(e) => Err(e),
            };
            let _ = completions.send(Completion::Started { generation, result });
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let generation = self.session.generation();
        let Some(session_id) = self.session.begin_stop() else {
            warn!("Ignoring stop: session is {}", self.session.state());
            return Err(StreamError::NotActive);
        };
        info!("Stopping session {}", session_id);
        self.release();
        self.publish();
        self.request_stop(generation, session_id);
        Ok(())
    }

    /// Halt capture and leave the push channel. Idempotent.
    fn release(&mut self) {
        self.pacer.disarm();
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
    }

    fn request_stop(&self, generation: u64, session_id: String) {
        let api = Arc::clone(&self.api);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = match api.stop_session(&session_id).await {
                Ok(ack) => ack.into_result("stop session"),
                Err(e) => Err(e),
            };
            let _ = completions.send(Completion::Stopped { generation, session_id, result });
        });
    }

    fn upload(&mut self, generation: u64, chunk: FrameChunk) -> Result<u64> {
        let session_id = match self.session.session_id() {
            Some(id) if self.session.is_current(generation, SessionState::Active) => id.to_string(),
            _ => return Err(StreamError::NotActive),
        };
        Ok(self.uploader.send(generation, &session_id, chunk))
    }

    /// Resize the decoder, refusing sizes beyond the capture maximum.
    fn resize(&mut self, geometry: VideoGeometry) -> Result<bool> {
        if !geometry.fits_within(self.max_geometry) {
            return Err(StreamError::config(format!(
                "frame geometry {} exceeds the capture maximum {}",
                geometry, self.max_geometry
            )));
        }
        Ok(self.decoder.set_geometry(geometry))
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Started { generation, result } => self.on_started(generation, result),
            Completion::Stopped { generation, session_id, result } => {
                if let Err(e) = &result {
                    warn!("Stop request for {} failed, session released anyway: {}", session_id, e);
                }
                if !self.session.finish_stop(generation) {
                    trace!("Discarding stale stop completion for {}", session_id);
                    return;
                }
                info!("Session {} stopped", session_id);
                self.renderer.clear();
                self.publish();
                self.emit(SessionEvent::Stopped);
            }
        }
    }

    fn on_started(&mut self, generation: u64, result: Result<String>) {
        if !self.session.is_current(generation, SessionState::Starting) {
            trace!("Discarding stale start completion (generation {})", generation);
            return;
        }

        match result {
            Ok(session_id) => {
                self.session.activate(generation, session_id.clone());
                info!("Session {} active", session_id);
                self.channel = Some(ControlChannel::open(
                    Arc::clone(&self.connector),
                    session_id.clone(),
                    generation,
                    self.policy.clone(),
                    self.notices.clone(),
                ));
                self.pacer.arm(generation);
                self.publish();
                self.emit(SessionEvent::Started { session_id });
            }
            Err(e) => {
                warn!("Session start failed: {}", e);
                self.session.fail();
                self.publish();
                self.report(&e);
            }
        }
    }

    fn on_upload(&mut self, outcome: UploadOutcome) {
        if !self.session.is_current(outcome.generation, SessionState::Active) {
            trace!("Discarding outcome of chunk #{} from an ended session", outcome.sequence);
            return;
        }
        self.emit(SessionEvent::ChunkResult { success: outcome.success() });
    }

    fn on_capture(&mut self, report: PacerReport) {
        match report {
            PacerReport::Geometry(geometry) => {
                if let Err(e) = self.resize(geometry) {
                    warn!("Ignoring camera geometry: {}", e);
                }
            }
            PacerReport::Frame { generation, chunk } => {
                if let Err(e) = self.upload(generation, chunk) {
                    trace!("Discarding frame captured for an ended session: {}", e);
                }
            }
        }
    }

    fn on_control(&mut self, notice: ControlNotice) {
        if !self.session.is_current(notice.generation, SessionState::Active) {
            trace!("Discarding control event from an ended session: {:?}", notice.event);
            return;
        }

        match notice.event {
            ControlEvent::Connected => debug!("Control channel connected"),
            ControlEvent::Joined => debug!("Joined session room"),
            ControlEvent::Subscribed => info!("Receiving processed frames"),
            ControlEvent::Interrupted { reason, retry_in } => {
                info!("Control channel interrupted ({}), reconnecting in {:?}", reason, retry_in);
            }
            ControlEvent::ProcessedChunk(chunk) => {
                self.render(&chunk);
                self.emit(SessionEvent::ProcessedFrame(chunk));
            }
            ControlEvent::ServerError(message) => {
                self.emit(SessionEvent::Error { message });
            }
            ControlEvent::ConnectionLost(reason) => self.fail_active(reason),
        }
    }

    /// `Active -> Failed` after the push channel gave up.
    fn fail_active(&mut self, reason: String) {
        let generation = self.session.generation();
        let session_id = self.session.session_id().map(str::to_string);
        warn!("Control channel lost, failing session: {}", reason);

        self.release();
        self.session.fail();
        self.publish();
        if let Some(session_id) = session_id {
            // best effort; the completion is stale by the time it arrives
            self.request_stop(generation, session_id);
        }
        self.report(&StreamError::transport(format!("control channel lost: {}", reason)));
    }

    fn render(&mut self, chunk: &ProcessedChunk) {
        match self.decoder.decode(chunk) {
            Decoded::Raster(raster) => self.renderer.present_raster(raster),
            Decoded::Fallback(waveform) => {
                debug!("Processed chunk of {} bytes shown as waveform", waveform.byte_len);
                self.renderer.present_fallback(&waveform);
            }
        }
    }

    fn redisplay(&mut self) -> bool {
        match self.decoder.redecode() {
            Some(Decoded::Raster(raster)) => self.renderer.present_raster(raster),
            Some(Decoded::Fallback(waveform)) => self.renderer.present_fallback(&waveform),
            None => return false,
        }
        true
    }

    fn report(&self, error: &StreamError) {
        if error.is_reportable() {
            self.emit(SessionEvent::Error { message: error.to_string() });
        } else {
            debug!("Not reporting local error: {}", error);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("No one is listening for session events");
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(SessionSnapshot::from(&self.session));
    }

    fn shutdown(&mut self) {
        let generation = self.session.generation();
        if let Some(session_id) = self.session.begin_stop() {
            info!("Controller dropped, releasing session {}", session_id);
            self.request_stop(generation, session_id);
        }
        self.release();
    }
}
