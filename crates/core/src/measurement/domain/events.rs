use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Advisory notifications for the host. The engine's state queries stay
/// authoritative; an event may be observed after the state has moved on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementEvent {
    StartRequested,
    StopRequested,
    MeasurementFinished,
}

/// Fans events out to every live subscriber over unbounded channels, so
/// emitting never blocks frame processing.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<MeasurementEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<MeasurementEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Sends to all subscribers, dropping those whose receiver is gone.
    pub fn emit(&mut self, event: MeasurementEvent) {
        log::debug!("Event {event:?}");
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
