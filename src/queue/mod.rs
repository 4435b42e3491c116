//! Kernel packet-queue boundary
//!
//! The decision path depends only on the [`PacketSource`]/[`VerdictSink`]
//! pair; the netlink NFQUEUE binding [`NfQueue`] is one implementation, and
//! tests drive the same path with an in-memory queue.

mod nfqueue;

pub use nfqueue::NfQueue;

use crate::Result;
use std::future::Future;

/// One diverted packet, as delivered by the kernel.
///
/// Lives only for the duration of one decision; nothing is kept after the
/// verdict goes back.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Kernel-assigned packet id, echoed back with the verdict.
    pub id: u32,
    /// Raw packet bytes, starting at the IP header.
    pub data: Vec<u8>,
    /// Mark already on the packet (0 = unset).
    pub mark: u32,
    /// Ingress interface index (0 = unknown).
    pub indev: u32,
    /// Egress interface index (0 = unknown).
    pub outdev: u32,
    /// Physical ingress interface index, for bridged traffic.
    pub physindev: u32,
    /// Physical egress interface index, for bridged traffic.
    pub physoutdev: u32,
}

/// Decision codes understood by the kernel queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VerdictKind {
    /// Silently discard the packet.
    Drop = 0,
    /// Let the packet continue through the current hook.
    Accept = 1,
    /// Re-run the hook's rules from the top.
    Repeat = 4,
}

/// A verdict for one packet, optionally rewriting its mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub mark: Option<u32>,
}

impl Verdict {
    /// Re-evaluate the packet with a new mark set, so the rules that
    /// queued it can route on the mark this time around.
    pub fn repeat_with_mark(mark: u32) -> Self {
        Self {
            kind: VerdictKind::Repeat,
            mark: Some(mark),
        }
    }
}

/// Queue binding lifecycle. Transitions only move forward; `Closing` and
/// `Closed` are reachable from any earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Created,
    Bound,
    QueueActive,
    Running,
    Closing,
    Closed,
}

/// Source half of the kernel boundary: delivers one packet per call.
pub trait PacketSource {
    fn recv(&mut self) -> impl Future<Output = Result<Packet>> + Send;
}

/// Sink half of the kernel boundary.
///
/// Must be called exactly once per received packet; an unanswered packet
/// stalls the kernel queue.
pub trait VerdictSink {
    fn send_verdict(&mut self, packet_id: u32, verdict: Verdict) -> Result<()>;
}
