//! Signals an instance reports back to its host.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// A lease is held and variables may be queried.
    Up,
    /// The lease was lost; the instance keeps running.
    Down,
    /// The instance failed. Always followed by [`HostSignal::Dead`].
    Error,
    /// The instance is gone and will not report anything else.
    Dead,
}

/// The sending half handed to an instance.
///
/// A host that stopped listening is not an error for the instance, so send
/// failures are only logged.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostSignal>,
}

impl HostHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn report(&self, signal: HostSignal) {
        tracing::debug!("Reporting {:?} to host", signal);
        if self.tx.send(signal).is_err() {
            tracing::warn!("Host is no longer listening, dropped {:?}", signal);
        }
    }
}
