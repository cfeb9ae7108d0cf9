//! # Operator Feedback
//!
//! Two outward collaborators the controller talks to while a request
//! runs:
//!
//! - [`Notifier`]: receives `Info` (starting), `Success` (confirmed)
//!   and `Error` (failed, with reason). Rendering is not our concern.
//! - [`ConfirmationPrompt`]: a blocking yes/no asked before any
//!   irreversible request. It is distinct from the click that started
//!   the request.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

// ════════════════════════════════════════════════════════════════════════════════
// NOTIFICATIONS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

/// Sink for operator-facing notifications. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used when no UI is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => error!("{}", notification.message),
            _ => info!("{}", notification.message),
        }
    }
}

/// Records every notification for later inspection.
#[derive(Default)]
pub struct MockNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.seen.lock().iter().map(|n| n.kind).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter(|n| n.kind == NotificationKind::Error)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CONFIRMATION PROMPT
// ════════════════════════════════════════════════════════════════════════════════

/// Blocking yes/no question put to the operator.
pub trait ConfirmationPrompt: Send + Sync {
    /// `true` only on an affirmative answer.
    fn confirm(&self, question: &str) -> bool;
}

/// Always answers the same way; records the questions asked.
pub struct FixedPrompt {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl FixedPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn accept() -> Self {
        Self::new(true)
    }

    pub fn decline() -> Self {
        Self::new(false)
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

impl ConfirmationPrompt for FixedPrompt {
    fn confirm(&self, question: &str) -> bool {
        self.asked.lock().push(question.to_string());
        self.answer
    }
}
