//! Frequency hand-off between the operator thread and the pipeline
//!
//! Producers post requests at any time; the pipeline drains the queue once
//! per iteration and only the most recent request survives.

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use super::Frequency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frequency controller is closed")]
pub struct ControllerClosed;

/// Create a connected producer/consumer pair
pub fn frequency_channel() -> (FrequencySender, FrequencyReceiver) {
    let (tx, rx) = unbounded();
    (FrequencySender { tx }, FrequencyReceiver { rx })
}

/// Producer half, cloneable across threads
#[derive(Debug, Clone)]
pub struct FrequencySender {
    tx: Sender<Frequency>,
}

impl FrequencySender {
    /// Queue a change request. Fails once the pipeline has shut down.
    pub fn request(&self, frequency: Frequency) -> Result<(), ControllerClosed> {
        self.tx.send(frequency).map_err(|_| ControllerClosed)
    }
}

/// Consumer half, owned by the pipeline
#[derive(Debug)]
pub struct FrequencyReceiver {
    rx: Receiver<Frequency>,
}

impl FrequencyReceiver {
    /// Take every queued request and keep the last one.
    pub fn drain_latest(&self) -> Option<Frequency> {
        self.rx.try_iter().last()
    }

    /// Latest queued request, if it differs from `current`.
    pub fn next_change(&self, current: Frequency) -> Option<Frequency> {
        self.drain_latest().filter(|f| *f != current)
    }
}
