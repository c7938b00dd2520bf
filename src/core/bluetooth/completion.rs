//! One-shot completion gate between the session and whoever started it.

use tokio::sync::oneshot;

use crate::core::bluetooth::types::Peripheral;
use crate::error::{SessionError, TransportError};

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// A connection was made and has ended. `error` holds the reason the
    /// connection was aborted early, if it was.
    Disconnected {
        peripheral: Peripheral,
        error: Option<SessionError>,
    },
    ConnectFailed {
        peripheral: Peripheral,
        error: TransportError,
    },
    /// Stopped from outside before any connection was established.
    Interrupted,
    /// The transport's event queue closed underneath the session.
    EventsClosed,
}

impl SessionOutcome {
    /// True when the session ran to a normal disconnect.
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionOutcome::Disconnected { error: None, .. })
    }
}

/// The firing half. Consumed on use, so a session can only complete once.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: oneshot::Sender<SessionOutcome>,
}

/// The waiting half, held by the top-level driver.
#[derive(Debug)]
pub struct CompletionWaiter {
    rx: oneshot::Receiver<SessionOutcome>,
}

pub fn completion() -> (CompletionSignal, CompletionWaiter) {
    let (tx, rx) = oneshot::channel();
    (CompletionSignal { tx }, CompletionWaiter { rx })
}

impl CompletionSignal {
    pub fn fire(self, outcome: SessionOutcome) {
        // Nobody waiting is not an error: the driver may have given up already.
        let _ = self.tx.send(outcome);
    }
}

impl CompletionWaiter {
    /// Blocks until the session has completed. A session dropped without firing
    /// counts as its event source going away.
    pub async fn wait(self) -> SessionOutcome {
        self.rx.await.unwrap_or(SessionOutcome::EventsClosed)
    }
}
