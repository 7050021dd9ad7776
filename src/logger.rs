//! Caller-side handle for the progress console.
//!
//! The console transcript is owned by a single consumer loop (TUI thread or
//! text-mode loop). Everything else, the operation driver included, talks to
//! it only by enqueuing [`ConsoleMessage`]s through a [`ProgressHandle`], so
//! the transcript is never touched from two contexts at once.

use crate::model::{ConsoleMessage, FileConflictAction, MessageLevel};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Floor on console visibility before a close request takes effect. Keeps a
/// fast operation from flashing a window the user cannot read.
pub const DEFAULT_MIN_VISIBLE: Duration = Duration::from_millis(500);

/// Logging surface handed to the operation driver.
pub trait OperationLogger {
    /// Record one formatted entry. Must never block the caller.
    fn log(&self, level: MessageLevel, message: String);

    /// Answer a file-conflict query raised by the driver.
    fn resolve_file_conflict(&self, message: &str) -> FileConflictAction;
}

/// Marks the moment the console became visible. Set exactly once by the
/// owning context; later attempts are ignored.
#[derive(Clone, Default)]
pub struct VisibleMark(Arc<OnceLock<Instant>>);

impl VisibleMark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self) {
        let _ = self.0.set(Instant::now());
    }

    fn get(&self) -> Option<Instant> {
        self.0.get().copied()
    }
}

/// Cloneable sender side of the console queue.
///
/// All fields other than the queue itself are immutable after construction,
/// so a handle can be cloned into any number of worker tasks freely.
#[derive(Clone)]
pub struct ProgressHandle {
    msg_tx: UnboundedSender<ConsoleMessage>,
    visible_at: VisibleMark,
    min_visible: Duration,
    conflict_action: FileConflictAction,
}

impl ProgressHandle {
    pub fn new(
        msg_tx: UnboundedSender<ConsoleMessage>,
        visible_at: VisibleMark,
        conflict_action: FileConflictAction,
        min_visible: Duration,
    ) -> Self {
        Self {
            msg_tx,
            visible_at,
            min_visible,
            conflict_action,
        }
    }

    /// Ask the owning context to close the console.
    ///
    /// If the console has been visible for at least the minimum duration the
    /// close message is enqueued right away. Otherwise a one-shot timer task
    /// sleeps out the remainder and enqueues it then; the caller is never
    /// blocked either way. Repeated calls may schedule independent timers;
    /// the consumer treats a second close as a no-op, so that is harmless.
    ///
    /// Must be called from within the tokio runtime.
    pub fn request_close(&self) {
        let remaining = match self.visible_at.get() {
            Some(shown) => self.min_visible.saturating_sub(shown.elapsed()),
            // Not visible yet: wait out the full minimum.
            None => self.min_visible,
        };

        if remaining.is_zero() {
            let _ = self.msg_tx.send(ConsoleMessage::Close);
            return;
        }

        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = tx.send(ConsoleMessage::Close);
        });
    }
}

impl OperationLogger for ProgressHandle {
    fn log(&self, level: MessageLevel, message: String) {
        // Fire-and-forget: if the consumer is gone the entry is dropped.
        let _ = self.msg_tx.send(ConsoleMessage::Entry {
            level,
            text: message,
        });
    }

    fn resolve_file_conflict(&self, _message: &str) -> FileConflictAction {
        self.conflict_action
    }
}
