//! Capture session lifecycle.
//!
//! ```text
//!   Idle ─setup─▶ SetupInProgress ─▶ Ready ─start─▶ Capturing
//!                      │                                │
//!                      ▼                                ▼
//!                    Error ───────cleanup──────▶ CleanupInProgress ─▶ Done
//! ```
//!
//! Setup and start race against the session's cancellation token. Cleanup
//! never does: once begun it runs to completion, and it runs at most once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sniffer::{CleanupReport, SetupOutcome, Sniffer};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    SetupInProgress,
    Ready,
    Capturing,
    CleanupInProgress,
    Done,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::SetupInProgress => "setting up",
            Self::Ready => "ready",
            Self::Capturing => "capturing",
            Self::CleanupInProgress => "cleaning up",
            Self::Done => "done",
            Self::Error => "failed",
        };
        f.write_str(s)
    }
}

/// How the capture stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureEnd {
    /// The remote capture command exited on its own.
    Completed,
    /// The session was cancelled while capturing.
    Interrupted,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub setup: SetupOutcome,
    pub capture: CaptureEnd,
    pub cleanup: CleanupReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one strategy through setup, capture and cleanup.
pub struct SnifferSession {
    sniffer: Box<dyn Sniffer>,
    state: SessionState,
    cancel: CancellationToken,
    cleaned_up: bool,
}

impl SnifferSession {
    pub fn new(sniffer: Box<dyn Sniffer>, cancel: CancellationToken) -> Self {
        Self {
            sniffer,
            state: SessionState::Idle,
            cancel,
            cleaned_up: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn require(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation: operation.to_string(),
                state: self.state.to_string(),
            })
        }
    }

    /// Runs the strategy's setup. Valid only from `Idle`.
    pub async fn setup(&mut self) -> Result<SetupOutcome> {
        self.require(SessionState::Idle, "set up")?;
        self.state = SessionState::SetupInProgress;
        info!("setting up {} sniffer", self.sniffer.name());

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Interrupted {
                stage: "setup".to_string(),
            }),
            result = self.sniffer.setup(&self.cancel) => result,
        };

        self.state = if result.is_ok() {
            SessionState::Ready
        } else {
            SessionState::Error
        };
        result
    }

    /// Streams the capture into `sink`. Valid only from `Ready`.
    pub async fn start(&mut self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<CaptureEnd> {
        self.require(SessionState::Ready, "start capture")?;
        self.state = SessionState::Capturing;
        info!("starting capture");

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(CaptureEnd::Interrupted),
            result = self.sniffer.start(sink) => result.map(|()| CaptureEnd::Completed),
        };

        match result {
            Ok(end) => {
                info!("capture ended: {:?}", end);
                Ok(end)
            }
            // The consumer going away mid-stream surfaces as a write error.
            Err(e) if self.cancel.is_cancelled() => {
                debug!("capture stream error after cancellation: {}", e);
                Ok(CaptureEnd::Interrupted)
            }
            Err(e) => {
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    /// Removes everything the strategy created. Later calls do nothing.
    pub async fn cleanup(&mut self) -> CleanupReport {
        if self.cleaned_up {
            debug!("cleanup already ran");
            return CleanupReport::default();
        }
        self.cleaned_up = true;

        let failed = self.state == SessionState::Error;
        self.state = SessionState::CleanupInProgress;
        info!("cleaning up {} sniffer", self.sniffer.name());

        let report = self.sniffer.cleanup().await;
        for failure in &report.failures {
            warn!("{}", failure);
        }

        self.state = if failed {
            SessionState::Error
        } else {
            SessionState::Done
        };
        report
    }

    /// Runs setup and capture, then always cleans up.
    ///
    /// Setup and capture errors are returned after cleanup has run. Cleanup
    /// failures never turn a completed capture into an error; they are
    /// listed in the report.
    pub async fn run(&mut self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<SessionReport> {
        let started_at = Utc::now();

        let outcome = match self.setup().await {
            Ok(setup) => self.start(sink).await.map(|capture| (setup, capture)),
            Err(e) => Err(e),
        };

        let cleanup = self.cleanup().await;
        if !cleanup.is_clean() {
            warn!(
                "{} cleanup step(s) failed, remove leftover resources manually",
                cleanup.failures.len()
            );
        }

        let (setup, capture) = outcome?;
        Ok(SessionReport {
            setup,
            capture,
            cleanup,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

impl fmt::Debug for SnifferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnifferSession")
            .field("sniffer", &self.sniffer.name())
            .field("state", &self.state)
            .field("cleaned_up", &self.cleaned_up)
            .finish()
    }
}

/// Cancels `cancel` on the first Ctrl-C. Further interrupts are only logged,
/// so cleanup is never triggered twice.
pub fn spawn_interrupt_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("unable to listen for interrupts: {}", e);
                return;
            }
            received += 1;
            if received == 1 {
                info!("interrupt received, stopping capture and cleaning up");
                cancel.cancel();
            } else {
                warn!("cleanup in progress, please wait");
            }
        }
    })
}
