//! Driver Monitoring Session
//!
//! Wires the frame hand-off, frame-rate gate, inference collaborators,
//! fatigue pipeline and alert controller into a single task per session.
//! The task owns all session state; other tasks talk to it through a
//! [`SessionHandle`].

mod clock;
mod context;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{SessionConfig, SessionContext, SessionStats, StateSnapshot};
pub use session::{MonitoringSession, SessionSummary};

use inference_engine::InferenceError;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Inference collaborator unavailable: {0}")]
    InferenceUnavailable(#[source] InferenceError),

    #[error("Monitoring session has stopped")]
    Closed,
}

impl SessionError {
    /// Whether starting or contacting the session again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::InferenceUnavailable(e) => e.is_retryable(),
            SessionError::Closed => false,
        }
    }
}

/// Requests served by the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Driver confirmed alertness
    Acknowledge,
    /// Clear history, alert state and timers
    Reset,
    Stop,
}

/// Cloneable handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<Option<StateSnapshot>>,
}

impl SessionHandle {
    fn new(
        commands: mpsc::Sender<SessionCommand>,
        snapshots: watch::Receiver<Option<StateSnapshot>>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    pub async fn acknowledge(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Acknowledge).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Reset).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Whether the session task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<StateSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<StateSnapshot>> {
        self.snapshots.clone()
    }
}
