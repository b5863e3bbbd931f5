//! Bounded snapshot buffer shared between a simulation's worker thread and
//! its readers (`spec.md` §4.7 "MetricsRing").

use crossbeam_queue::ArrayQueue;

use crate::grid::Snapshot;

/// Default capacity, per `spec.md` §4.7.
pub const DEFAULT_CAPACITY: usize = 4096;

/// A bounded single-producer, multi-consumer ring of snapshots. When full,
/// the oldest snapshot is dropped to make room for the newest — metrics
/// consumers are expected to fall behind occasionally, not to stall the
/// worker thread.
pub struct MetricsRing {
    queue: ArrayQueue<Snapshot>,
}

impl MetricsRing {
    /// Creates a ring that holds at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Pushes `snapshot`, evicting the oldest entry if the ring is full.
    pub fn push(&self, snapshot: Snapshot) {
        let mut snapshot = snapshot;
        while let Err(rejected) = self.queue.push(snapshot) {
            snapshot = rejected;
            self.queue.pop();
        }
    }

    /// Removes and returns the oldest snapshot, if any.
    pub fn try_pop(&self) -> Option<Snapshot> {
        self.queue.pop()
    }

    /// Drains every currently buffered snapshot, oldest first.
    pub fn drain(&self) -> Vec<Snapshot> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(s) = self.queue.pop() {
            out.push(s);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl Default for MetricsRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(tick_number: u64) -> Snapshot {
        Snapshot {
            simulation_id: 1,
            tick_number,
            timestamp: Duration::from_secs(tick_number),
            total_generation_mw: 0.0,
            total_consumption_mw: 0.0,
            grid_frequency_hz: 50.0,
            grid_voltage_kv: 230.0,
            efficiency_percentage: 100.0,
            fault_count: 0,
            active_failure_ids: Vec::new(),
            alerts: Vec::new(),
        }
    }

    #[test]
    fn push_then_pop_round_trips() {
        let ring = MetricsRing::new(4);
        ring.push(snapshot(1));
        let popped = ring.try_pop().unwrap();
        assert_eq!(popped.tick_number, 1);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_ring_evicts_oldest() {
        let ring = MetricsRing::new(2);
        ring.push(snapshot(1));
        ring.push(snapshot(2));
        ring.push(snapshot(3));
        let drained = ring.drain();
        let ticks: Vec<u64> = drained.iter().map(|s| s.tick_number).collect();
        assert_eq!(ticks, vec![2, 3]);
    }

    #[test]
    fn drain_empties_the_ring() {
        let ring = MetricsRing::new(8);
        for t in 0..5 {
            ring.push(snapshot(t));
        }
        assert_eq!(ring.drain().len(), 5);
        assert!(ring.is_empty());
    }
}
