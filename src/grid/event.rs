//! Per-tick event intake (`spec.md` §4.6 "EventBatch").

use std::time::Duration;

use crate::error::VoltEdgeError;
use crate::grid::fault::FaultKind;

/// Upper bound on pending events per tick, per `spec.md` §4.6.
pub const CAPACITY: usize = 64;

/// What an [`Event`] asks the grid to do.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Fault { component_id: u32, kind: FaultKind },
    Repair { component_id: u32 },
    SetPoint { plant_id: u32, target_output_mw: f64 },
}

/// One queued instruction, ordered for replay by `(timestamp, event_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: u64,
    pub timestamp: Duration,
    pub payload: EventPayload,
}

/// A fixed-capacity, FIFO-ish intake queue for one tick's worth of events.
///
/// Ordering on [`EventBatch::drain`] is by `(timestamp, event_id)`, not
/// insertion order, so replaying the same batch twice always applies events
/// in the same sequence regardless of arrival order.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<Event>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self { events: Vec::with_capacity(CAPACITY) }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Enqueues `event`, failing with [`VoltEdgeError::BatchFull`] once
    /// [`CAPACITY`] events are pending.
    pub fn push(&mut self, event: Event) -> Result<(), VoltEdgeError> {
        if self.events.len() >= CAPACITY {
            return Err(VoltEdgeError::BatchFull);
        }
        self.events.push(event);
        Ok(())
    }

    /// Removes and returns all pending events, sorted by `(timestamp,
    /// event_id)` ascending. The batch is empty afterward.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut drained: Vec<Event> = self.events.drain(..).collect();
        drained.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.event_id.cmp(&b.event_id)));
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(event_id: u64, secs: u64) -> Event {
        Event {
            event_id,
            timestamp: Duration::from_secs(secs),
            payload: EventPayload::Repair { component_id: 1 },
        }
    }

    #[test]
    fn push_rejects_once_full() {
        let mut batch = EventBatch::new();
        for i in 0..CAPACITY as u64 {
            batch.push(ev(i, 0)).unwrap();
        }
        assert_eq!(batch.push(ev(999, 0)), Err(VoltEdgeError::BatchFull));
    }

    #[test]
    fn drain_orders_by_timestamp_then_event_id() {
        let mut batch = EventBatch::new();
        batch.push(ev(5, 10)).unwrap();
        batch.push(ev(1, 10)).unwrap();
        batch.push(ev(2, 5)).unwrap();
        let drained = batch.drain();
        let ids: Vec<u64> = drained.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![2, 1, 5]);
        assert!(batch.is_empty());
    }
}
