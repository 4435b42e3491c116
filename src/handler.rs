//! Per-packet decision handling
//!
//! One verdict per packet, unconditionally. Classification trouble is
//! absorbed here and shows up as empty endpoint labels at most; an
//! unanswered packet would stall the kernel queue, so nothing on this path
//! is allowed to fail.

use crate::classify;
use crate::mark::MarkAllocator;
use crate::queue::{Packet, Verdict};
use tracing::info;

/// Decides every packet the queue delivers.
pub struct PacketHandler {
    allocator: MarkAllocator,
    log_packet: bool,
    log_mark: bool,
}

impl PacketHandler {
    pub fn new(allocator: MarkAllocator, log_packet: bool, log_mark: bool) -> Self {
        Self {
            allocator,
            log_packet,
            log_mark,
        }
    }

    /// Decides one packet: optional diagnostics, then a fresh mark, then a
    /// REPEAT verdict carrying it. The caller delivers the verdict exactly
    /// once.
    pub fn handle(&self, packet: &Packet) -> Verdict {
        if self.log_packet {
            let endpoints = classify::classify(&packet.data);
            info!(
                id = packet.id,
                mark = packet.mark,
                indev = packet.indev,
                outdev = packet.outdev,
                physindev = packet.physindev,
                physoutdev = packet.physoutdev,
                src = %endpoints.src,
                dst = %endpoints.dst,
                "packet received"
            );
            info!("payload:\n{}", hex_dump(&packet.data));
        }

        let mark = self.allocator.next_mark();

        if self.log_mark {
            if self.log_packet {
                info!(id = packet.id, mark, "mark selected");
            } else {
                info!(mark, "mark selected");
            }
        }

        Verdict::repeat_with_mark(mark)
    }
}

/// Renders bytes as a classic hex dump: offset, hex columns, ASCII gutter.
fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}  ", row * 16));
        for col in 0..16 {
            match chunk.get(col) {
                Some(byte) => out.push_str(&format!("{:02x} ", byte)),
                None => out.push_str("   "),
            }
            if col == 7 {
                out.push(' ');
            }
        }
        out.push('|');
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                out.push(*byte as char);
            } else {
                out.push('.');
            }
        }
        out.push_str("|\n");
    }
    out
}
