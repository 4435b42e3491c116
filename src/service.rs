//! Receive-loop lifecycle
//!
//! Wires a packet source to the decision handler and delivers every verdict
//! back to the sink. Shutdown arrives asynchronously (SIGINT) and is
//! observed between iterations; in-flight packets are not drained, and the
//! queue resource is released before the process exits.

use crate::handler::PacketHandler;
use crate::queue::{PacketSource, VerdictSink};
use crate::telemetry::QueueMetrics;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// The running service: one queue, one handler, one loop.
pub struct Service<Q> {
    queue: Q,
    handler: PacketHandler,
    metrics: Arc<QueueMetrics>,
}

impl<Q: PacketSource + VerdictSink> Service<Q> {
    pub fn new(queue: Q, handler: PacketHandler) -> Self {
        Self {
            queue,
            handler,
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<QueueMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Receives one packet, decides it, and delivers the verdict.
    ///
    /// Transport errors on either side are fatal for the loop; there is no
    /// retry, the kernel offers no partial-failure recovery.
    pub async fn process_one(&mut self) -> Result<()> {
        let packet = self.queue.recv().await?;
        self.metrics.record_packet(packet.data.len());

        let verdict = self.handler.handle(&packet);

        self.queue.send_verdict(packet.id, verdict)?;
        self.metrics.record_verdict();
        Ok(())
    }

    /// Runs until interrupted. Each iteration handles exactly one packet;
    /// the interrupt is observed between iterations, so a packet mid-flight
    /// completes its verdict before the loop exits.
    pub async fn run(&mut self) -> Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            let packet = tokio::select! {
                _ = &mut ctrl_c => {
                    info!("interrupt received, shutting down");
                    break;
                }
                received = self.queue.recv() => received?,
            };

            self.metrics.record_packet(packet.data.len());
            let verdict = self.handler.handle(&packet);
            self.queue.send_verdict(packet.id, verdict)?;
            self.metrics.record_verdict();
        }

        info!(
            packets = self.metrics.packets_received.get(),
            bytes = self.metrics.bytes_received.get(),
            verdicts = self.metrics.verdicts_sent.get(),
            "queue summary"
        );
        Ok(())
    }
}
