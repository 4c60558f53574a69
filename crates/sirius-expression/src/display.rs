//! Display collaborator and real-time timeline playback.

use crate::error::ExpressionError;
use crate::kind::ExpressionKind;
use crate::timing::Timeline;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Anything that can show a face. Sending the same kind twice in a row must be harmless.
pub trait ExpressionDisplay: Send + Sync {
    fn set_expression(&self, kind: ExpressionKind) -> Result<(), ExpressionError>;
}

/// Display that only logs; used by the daemon when no face is attached.
#[derive(Debug, Default)]
pub struct LoggingDisplay;

impl ExpressionDisplay for LoggingDisplay {
    fn set_expression(&self, kind: ExpressionKind) -> Result<(), ExpressionError> {
        info!("🙂 Expression -> {}", kind);
        Ok(())
    }
}

/// Display that remembers every command it received.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    shown: Mutex<Vec<ExpressionKind>>,
    fail_on: Option<ExpressionKind>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every command for `kind`.
    pub fn failing_on(kind: ExpressionKind) -> Self {
        Self {
            shown: Mutex::new(Vec::new()),
            fail_on: Some(kind),
        }
    }

    pub fn shown(&self) -> Vec<ExpressionKind> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ExpressionDisplay for RecordingDisplay {
    fn set_expression(&self, kind: ExpressionKind) -> Result<(), ExpressionError> {
        if self.fail_on == Some(kind) {
            return Err(ExpressionError::Display(format!("cannot show {kind}")));
        }
        self.shown
            .lock()
            .map_err(|e| ExpressionError::Display(e.to_string()))?
            .push(kind);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackReport {
    pub applied: usize,
    /// Events whose kind was already showing.
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Drives a display through a [`Timeline`] in real time, alongside audio playback.
pub struct TimelinePlayer {
    display: Arc<dyn ExpressionDisplay>,
}

impl TimelinePlayer {
    pub fn new(display: Arc<dyn ExpressionDisplay>) -> Self {
        Self { display }
    }

    /// Play `timeline` from now. Returns to `base` when the speech ends or when
    /// `cancel` turns true.
    pub async fn play(
        &self,
        timeline: &Timeline,
        base: ExpressionKind,
        mut cancel: watch::Receiver<bool>,
    ) -> PlaybackReport {
        let start = Instant::now();
        let mut report = PlaybackReport::default();
        let mut last_sent: Option<ExpressionKind> = None;

        for event in &timeline.events {
            if wait_until(start + event.at, &mut cancel).await {
                report.cancelled = true;
                break;
            }
            self.apply(event.expression, &mut last_sent, &mut report);
        }

        if !report.cancelled && wait_until(start + timeline.total, &mut cancel).await {
            report.cancelled = true;
        }
        if report.cancelled {
            info!("⏹️ Expression playback cancelled");
        }

        // Restore is not counted as a timeline event.
        if last_sent.is_some_and(|kind| kind != base) {
            if let Err(e) = self.display.set_expression(base) {
                warn!("Failed to restore base expression {}: {}", base, e);
            }
        }
        debug!(?report, "expression playback finished");
        report
    }

    fn apply(
        &self,
        kind: ExpressionKind,
        last_sent: &mut Option<ExpressionKind>,
        report: &mut PlaybackReport,
    ) {
        if *last_sent == Some(kind) {
            report.skipped += 1;
            return;
        }
        match self.display.set_expression(kind) {
            Ok(()) => {
                report.applied += 1;
                *last_sent = Some(kind);
            }
            Err(e) => {
                warn!("Display rejected expression {}: {}", kind, e);
                report.failed += 1;
            }
        }
    }
}

/// Sleep until `deadline`. Returns true if cancelled first.
async fn wait_until(deadline: Instant, cancel: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *cancel.borrow() {
            return true;
        }
        tokio::select! {
            _ = sleep_until(deadline) => return false,
            changed = cancel.changed() => {
                if changed.is_err() {
                    // Sender gone; nobody can cancel any more.
                    sleep_until(deadline).await;
                    return false;
                }
            }
        }
    }
}

/// Convenience for callers that never cancel.
pub fn never_cancel() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}
