//! Session identity and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started yet
    #[default]
    Idle,

    /// Start request in flight
    Starting,

    /// Service acknowledged the session; capture and push channel are live
    Active,

    /// Stop request in flight; local resources are already released
    Stopping,

    /// Stop completed (equivalent to `Idle`)
    Stopped,

    /// Start or connection failed; a new `start` may be issued
    Failed,
}

impl SessionState {
    /// Whether a new start request is accepted from this state.
    pub fn accepts_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped | SessionState::Failed)
    }

    /// Whether the state holds no session at all.
    pub fn is_idle(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One streaming run, owned by the session controller.
///
/// The transition methods are the only writers of `state` and `session_id`.
/// Every start bumps `generation`; asynchronous completions carry the
/// generation they were issued under so stale results can be recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    device_id: Option<String>,
    session_id: Option<String>,
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Server-issued identifier, present only while `Active`.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a completion issued under `generation` still applies in `state`.
    pub fn is_current(&self, generation: u64, state: SessionState) -> bool {
        self.generation == generation && self.state == state
    }

    /// `Idle|Stopped|Failed -> Starting`. Returns the new generation, or `None`
    /// when a session is already in progress.
    pub fn begin_start(&mut self, device_id: impl Into<String>) -> Option<u64> {
        if !self.state.accepts_start() {
            return None;
        }
        self.generation += 1;
        self.state = SessionState::Starting;
        self.device_id = Some(device_id.into());
        self.session_id = None;
        Some(self.generation)
    }

    /// `Starting -> Active` for the matching generation.
    pub fn activate(&mut self, generation: u64, session_id: impl Into<String>) -> bool {
        if !self.is_current(generation, SessionState::Starting) {
            return false;
        }
        self.state = SessionState::Active;
        self.session_id = Some(session_id.into());
        true
    }

    /// `Active -> Stopping`. Clears the session identity and returns it so the
    /// stop request can still name the session.
    pub fn begin_stop(&mut self) -> Option<String> {
        if self.state != SessionState::Active {
            return None;
        }
        self.state = SessionState::Stopping;
        self.session_id.take()
    }

    /// `Stopping -> Stopped` for the matching generation.
    pub fn finish_stop(&mut self, generation: u64) -> bool {
        if !self.is_current(generation, SessionState::Stopping) {
            return false;
        }
        self.state = SessionState::Stopped;
        self.device_id = None;
        true
    }

    /// `Starting|Active -> Failed`.
    pub fn fail(&mut self) -> bool {
        if !matches!(self.state, SessionState::Starting | SessionState::Active) {
            return false;
        }
        self.state = SessionState::Failed;
        self.session_id = None;
        true
    }
}

/// Read-only view of the session published to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub device_id: Option<String>,
    pub session_id: Option<String>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            state: session.state,
            device_id: session.device_id.clone(),
            session_id: session.session_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle() {
        let mut session = Session::new();
        let generation = session.begin_start("dev-1").unwrap();
        assert_eq!(session.state(), SessionState::Starting);

        assert!(session.activate(generation, "s-42"));
        assert_eq!(session.session_id(), Some("s-42"));

        assert_eq!(session.begin_stop().as_deref(), Some("s-42"));
        assert_eq!(session.state(), SessionState::Stopping);
        assert_eq!(session.session_id(), None);

        assert!(session.finish_stop(generation));
        assert!(session.state().is_idle());
        assert!(session.state().accepts_start());
    }

    #[test]
    fn duplicate_start_is_refused() {
        let mut session = Session::new();
        let generation = session.begin_start("dev-1").unwrap();
        assert_eq!(session.begin_start("dev-1"), None);

        session.activate(generation, "s-1");
        assert_eq!(session.begin_start("dev-1"), None);
        assert_eq!(session.generation(), generation);
    }

    #[test]
    fn stop_requires_active_session() {
        let mut session = Session::new();
        assert_eq!(session.begin_stop(), None);
        assert_eq!(session, Session::new());

        session.begin_start("dev-1");
        assert_eq!(session.begin_stop(), None);
        assert_eq!(session.state(), SessionState::Starting);
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut session = Session::new();
        let first = session.begin_start("dev-1").unwrap();
        session.fail();
        let second = session.begin_start("dev-1").unwrap();

        assert!(!session.activate(first, "old"));
        assert!(session.activate(second, "new"));
        assert_eq!(session.session_id(), Some("new"));
    }

    #[test]
    fn failed_session_can_restart() {
        let mut session = Session::new();
        let generation = session.begin_start("dev-1").unwrap();
        session.activate(generation, "s-1");
        assert!(session.fail());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.session_id(), None);
        assert!(session.begin_start("dev-1").is_some());
    }
}
