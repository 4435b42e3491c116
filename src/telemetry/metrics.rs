//! Packet counters for the queue service.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters covering one queue binding's lifetime.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Packets delivered by the kernel queue.
    pub packets_received: Counter,
    /// Raw payload bytes delivered.
    pub bytes_received: Counter,
    /// Verdicts handed back to the kernel.
    pub verdicts_sent: Counter,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one delivered packet.
    pub fn record_packet(&self, bytes: usize) {
        self.packets_received.inc();
        self.bytes_received.add(bytes as u64);
    }

    /// Records one verdict sent back.
    pub fn record_verdict(&self) {
        self.verdicts_sent.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(41);
        assert_eq!(counter.get(), 42);
    }

    #[test]
    fn test_record_packet() {
        let metrics = QueueMetrics::new();
        metrics.record_packet(100);
        metrics.record_packet(28);
        metrics.record_verdict();

        assert_eq!(metrics.packets_received.get(), 2);
        assert_eq!(metrics.bytes_received.get(), 128);
        assert_eq!(metrics.verdicts_sent.get(), 1);
    }
}
