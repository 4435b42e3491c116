//! NFQUEUE binding over a raw netlink socket
//!
//! Speaks NETLINK_NETFILTER directly: protocol-family and queue binding,
//! packet message parsing, and verdict delivery. The socket stays blocking
//! while configuration commands wait for their acks, then moves onto the
//! async reactor for the receive loop.

use super::{Packet, PacketSource, QueueState, Verdict, VerdictSink};
use crate::{Error, Result};
use std::os::unix::io::RawFd;
use tokio::io::unix::AsyncFd;
use tracing::debug;

const NETLINK_NETFILTER: i32 = 12;
const NFNL_SUBSYS_QUEUE: u16 = 3;

// Message types within the queue subsystem
const NFQNL_MSG_PACKET: u16 = 0;
const NFQNL_MSG_VERDICT: u16 = 1;
const NFQNL_MSG_CONFIG: u16 = 2;

// Queue configuration commands
const NFQNL_CFG_CMD_BIND: u8 = 1;
const NFQNL_CFG_CMD_UNBIND: u8 = 2;
const NFQNL_CFG_CMD_PF_BIND: u8 = 3;
const NFQNL_CFG_CMD_PF_UNBIND: u8 = 4;

/// Copy mode: deliver the full packet to user space
const NFQNL_COPY_PACKET: u8 = 2;
const COPY_RANGE: u32 = 0xffff;

// Attributes on packet and verdict messages
const NFQA_PACKET_HDR: u16 = 1;
const NFQA_VERDICT_HDR: u16 = 2;
const NFQA_MARK: u16 = 3;
const NFQA_IFINDEX_INDEV: u16 = 4;
const NFQA_IFINDEX_OUTDEV: u16 = 5;
const NFQA_IFINDEX_PHYSINDEV: u16 = 6;
const NFQA_IFINDEX_PHYSOUTDEV: u16 = 7;
const NFQA_PAYLOAD: u16 = 10;

// Attributes on config messages
const NFQA_CFG_CMD: u16 = 1;
const NFQA_CFG_PARAMS: u16 = 2;

const NLM_F_REQUEST: u16 = 1;
const NLM_F_ACK: u16 = 4;
const NLMSG_ERROR: u16 = 2;

const NLMSG_HDRLEN: usize = 16;
const NFGENMSG_LEN: usize = 4;
const RECV_BUF_LEN: usize = 65536;

/// A bound NFQUEUE, implementing both halves of the kernel boundary.
pub struct NfQueue {
    fd: RawFd,
    async_fd: Option<AsyncFd<RawFd>>,
    queue_num: u16,
    seq: u32,
    state: QueueState,
}

impl NfQueue {
    /// Opens a netlink socket and attaches the AF_INET protocol family to
    /// the queue subsystem. Moves the lifecycle `Created -> Bound`.
    pub fn open() -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, NETLINK_NETFILTER) };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        let mut queue = Self {
            fd,
            async_fd: None,
            queue_num: 0,
            seq: 0,
            state: QueueState::Created,
        };

        // Unbind first in case a stale family binding is still attached,
        // then bind fresh.
        queue.config_cmd(NFQNL_CFG_CMD_PF_UNBIND, libc::AF_INET as u16, 0, true)?;
        queue.config_cmd(NFQNL_CFG_CMD_PF_BIND, libc::AF_INET as u16, 0, true)?;

        queue.state = QueueState::Bound;
        debug!("netlink socket open, AF_INET bound to queue subsystem");
        Ok(queue)
    }

    /// Binds the given queue number and requests full packet copies.
    /// Moves the lifecycle `Bound -> QueueActive`.
    pub fn create_queue(&mut self, queue_num: u16) -> Result<()> {
        if self.state != QueueState::Bound {
            return Err(Error::Queue(format!(
                "cannot create queue in state {:?}",
                self.state
            )));
        }

        self.queue_num = queue_num;
        self.config_cmd(NFQNL_CFG_CMD_BIND, libc::AF_UNSPEC as u16, queue_num, true)?;
        self.config_params(COPY_RANGE)?;

        // Configuration is done; hand the socket to the async reactor for
        // the receive loop.
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        self.async_fd = Some(AsyncFd::new(self.fd).map_err(Error::Io)?);

        self.state = QueueState::QueueActive;
        debug!(queue_num, "queue active");
        Ok(())
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Receives the next diverted packet.
    ///
    /// Skips over non-packet messages (late acks); the first call moves the
    /// lifecycle `QueueActive -> Running`.
    pub async fn recv(&mut self) -> Result<Packet> {
        if self.state == QueueState::QueueActive {
            self.state = QueueState::Running;
            debug!("entering receive loop");
        }

        let async_fd = self
            .async_fd
            .as_mut()
            .ok_or_else(|| Error::Queue("queue is not active".into()))?;

        let mut buf = vec![0u8; RECV_BUF_LEN];
        loop {
            let mut guard = async_fd.readable_mut().await.map_err(Error::Io)?;

            let result = guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(Ok(len)) => match parse_message(&buf[..len])? {
                    Some(packet) => return Ok(packet),
                    None => continue,
                },
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Releases the queue binding and closes the socket.
    ///
    /// One-shot: only the first call talks to the kernel; later calls (and
    /// the drop path after an explicit close) are no-ops.
    pub fn close(&mut self) {
        if matches!(self.state, QueueState::Closing | QueueState::Closed) {
            return;
        }
        self.state = QueueState::Closing;

        if self.async_fd.is_some() {
            // Queue was created; detach it. No ack wait on the way out.
            let _ = self.config_cmd(
                NFQNL_CFG_CMD_UNBIND,
                libc::AF_UNSPEC as u16,
                self.queue_num,
                false,
            );
        }

        // Deregister from the reactor before closing the descriptor.
        self.async_fd = None;
        unsafe { libc::close(self.fd) };

        self.state = QueueState::Closed;
        debug!("queue released");
    }

    fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    fn config_cmd(&mut self, cmd: u8, pf: u16, res_id: u16, ack: bool) -> Result<()> {
        // nfqnl_msg_config_cmd: command, pad, protocol family (big-endian)
        let mut cmd_data = [0u8; 4];
        cmd_data[0] = cmd;
        cmd_data[2..4].copy_from_slice(&pf.to_be_bytes());
        let attr = nlattr(NFQA_CFG_CMD, &cmd_data);
        self.send_config(res_id, &attr, ack)
    }

    fn config_params(&mut self, copy_range: u32) -> Result<()> {
        // nfqnl_msg_config_params: copy range (big-endian) + copy mode
        let mut params = [0u8; 5];
        params[..4].copy_from_slice(&copy_range.to_be_bytes());
        params[4] = NFQNL_COPY_PACKET;
        let attr = nlattr(NFQA_CFG_PARAMS, &params);
        self.send_config(self.queue_num, &attr, true)
    }

    fn send_config(&mut self, res_id: u16, attr: &[u8], ack: bool) -> Result<()> {
        let seq = self.next_seq();
        let flags = if ack { NLM_F_REQUEST | NLM_F_ACK } else { NLM_F_REQUEST };
        let msg_type = (NFNL_SUBSYS_QUEUE << 8) | NFQNL_MSG_CONFIG;

        let mut msg = nlmsghdr(NFGENMSG_LEN + attr.len(), msg_type, flags, seq);
        msg.extend_from_slice(&nfgenmsg(libc::AF_UNSPEC as u8, res_id));
        msg.extend_from_slice(attr);

        self.send_netlink(&msg)?;
        if ack {
            self.read_ack()?;
        }
        Ok(())
    }

    fn send_netlink(&self, data: &[u8]) -> Result<()> {
        let mut dst: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        dst.nl_family = libc::AF_NETLINK as u16;

        let sent = unsafe {
            libc::sendto(
                self.fd,
                data.as_ptr() as *const libc::c_void,
                data.len(),
                0,
                &dst as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };

        if sent < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Waits for the kernel's ack to the last configuration command.
    /// Only valid while the socket is still blocking.
    fn read_ack(&mut self) -> Result<()> {
        let mut buf = [0u8; 1024];
        let n = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if n < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        // An ack is an error message with errno 0; parse_message surfaces
        // real failures as Err.
        parse_message(&buf[..n as usize])?;
        Ok(())
    }
}

impl PacketSource for NfQueue {
    async fn recv(&mut self) -> Result<Packet> {
        NfQueue::recv(self).await
    }
}

impl VerdictSink for NfQueue {
    fn send_verdict(&mut self, packet_id: u32, verdict: Verdict) -> Result<()> {
        let seq = self.next_seq();
        let msg = build_verdict_message(self.queue_num, seq, packet_id, verdict);
        self.send_netlink(&msg)
    }
}

impl Drop for NfQueue {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds a netlink message header followed by nothing; callers append the
/// payload. `payload_len` covers everything after the 16-byte header.
fn nlmsghdr(payload_len: usize, msg_type: u16, flags: u16, seq: u32) -> Vec<u8> {
    let total = (NLMSG_HDRLEN + payload_len) as u32;
    let mut buf = Vec::with_capacity(NLMSG_HDRLEN + payload_len);
    buf.extend_from_slice(&total.to_ne_bytes());
    buf.extend_from_slice(&msg_type.to_ne_bytes());
    buf.extend_from_slice(&flags.to_ne_bytes());
    buf.extend_from_slice(&seq.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes()); // nlmsg_pid: kernel
    buf
}

/// nfgenmsg: family, NFNETLINK_V0, resource id (big-endian).
fn nfgenmsg(family: u8, res_id: u16) -> [u8; NFGENMSG_LEN] {
    let res = res_id.to_be_bytes();
    [family, 0, res[0], res[1]]
}

/// Encodes one netlink attribute, padded to 4-byte alignment.
fn nlattr(attr_type: u16, data: &[u8]) -> Vec<u8> {
    let len = (4 + data.len()) as u16;
    let padded = (len as usize + 3) & !3;

    let mut buf = Vec::with_capacity(padded);
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&attr_type.to_ne_bytes());
    buf.extend_from_slice(data);
    buf.resize(padded, 0);
    buf
}

/// Builds a complete verdict message for one packet.
fn build_verdict_message(queue_num: u16, seq: u32, packet_id: u32, verdict: Verdict) -> Vec<u8> {
    // nfqnl_msg_verdict_hdr: verdict code + packet id, both big-endian
    let mut verdict_hdr = [0u8; 8];
    verdict_hdr[..4].copy_from_slice(&(verdict.kind as u32).to_be_bytes());
    verdict_hdr[4..].copy_from_slice(&packet_id.to_be_bytes());

    let mut attrs = nlattr(NFQA_VERDICT_HDR, &verdict_hdr);
    if let Some(mark) = verdict.mark {
        attrs.extend_from_slice(&nlattr(NFQA_MARK, &mark.to_be_bytes()));
    }

    let msg_type = (NFNL_SUBSYS_QUEUE << 8) | NFQNL_MSG_VERDICT;
    let mut msg = nlmsghdr(NFGENMSG_LEN + attrs.len(), msg_type, NLM_F_REQUEST, seq);
    msg.extend_from_slice(&nfgenmsg(libc::AF_UNSPEC as u8, queue_num));
    msg.extend_from_slice(&attrs);
    msg
}

/// Parses one incoming netlink message.
///
/// Returns the packet for a queue packet message, `None` for acks and other
/// administrative messages, and an error for a kernel-reported failure.
fn parse_message(data: &[u8]) -> Result<Option<Packet>> {
    if data.len() < NLMSG_HDRLEN {
        return Ok(None);
    }

    let msg_type = u16::from_ne_bytes([data[4], data[5]]);

    if msg_type == NLMSG_ERROR {
        if data.len() >= NLMSG_HDRLEN + 4 {
            let errno = i32::from_ne_bytes([data[16], data[17], data[18], data[19]]);
            if errno != 0 {
                return Err(Error::Queue(format!(
                    "netlink error: {}",
                    std::io::Error::from_raw_os_error(-errno)
                )));
            }
        }
        return Ok(None);
    }

    if msg_type != (NFNL_SUBSYS_QUEUE << 8) | NFQNL_MSG_PACKET {
        return Ok(None);
    }

    let mut packet = Packet::default();

    // Attributes start after the netlink header and nfgenmsg.
    let mut pos = NLMSG_HDRLEN + NFGENMSG_LEN;
    while pos + 4 <= data.len() {
        let attr_len = u16::from_ne_bytes([data[pos], data[pos + 1]]) as usize;
        let attr_type = u16::from_ne_bytes([data[pos + 2], data[pos + 3]]);

        if attr_len < 4 || pos + attr_len > data.len() {
            break;
        }
        let attr_data = &data[pos + 4..pos + attr_len];

        match attr_type {
            NFQA_PACKET_HDR if attr_data.len() >= 4 => {
                packet.id = u32::from_be_bytes([
                    attr_data[0],
                    attr_data[1],
                    attr_data[2],
                    attr_data[3],
                ]);
            }
            NFQA_MARK if attr_data.len() >= 4 => {
                packet.mark = be_u32(attr_data);
            }
            NFQA_IFINDEX_INDEV if attr_data.len() >= 4 => {
                packet.indev = be_u32(attr_data);
            }
            NFQA_IFINDEX_OUTDEV if attr_data.len() >= 4 => {
                packet.outdev = be_u32(attr_data);
            }
            NFQA_IFINDEX_PHYSINDEV if attr_data.len() >= 4 => {
                packet.physindev = be_u32(attr_data);
            }
            NFQA_IFINDEX_PHYSOUTDEV if attr_data.len() >= 4 => {
                packet.physoutdev = be_u32(attr_data);
            }
            NFQA_PAYLOAD => {
                packet.data = attr_data.to_vec();
            }
            _ => {}
        }

        pos += (attr_len + 3) & !3;
    }

    Ok(Some(packet))
}

fn be_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::VerdictKind;

    #[test]
    fn test_nlattr_pads_to_alignment() {
        let attr = nlattr(NFQA_MARK, &[1, 2, 3, 4, 5]);
        // Length field counts header + data, the buffer is padded to 4
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 9);
        assert_eq!(attr.len(), 12);
        assert_eq!(&attr[9..], &[0, 0, 0]);
    }

    #[test]
    fn test_nlmsghdr_layout() {
        let hdr = nlmsghdr(8, 0x0302, NLM_F_REQUEST | NLM_F_ACK, 7);
        assert_eq!(hdr.len(), NLMSG_HDRLEN);
        assert_eq!(u32::from_ne_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]), 24);
        assert_eq!(u16::from_ne_bytes([hdr[4], hdr[5]]), 0x0302);
        assert_eq!(u16::from_ne_bytes([hdr[6], hdr[7]]), 5);
        assert_eq!(u32::from_ne_bytes([hdr[8], hdr[9], hdr[10], hdr[11]]), 7);
    }

    #[test]
    fn test_verdict_message_shape() {
        let msg = build_verdict_message(1, 9, 42, Verdict::repeat_with_mark(2));

        // nlmsghdr + nfgenmsg + verdict attr (12) + mark attr (8)
        assert_eq!(msg.len(), 40);
        assert_eq!(u32::from_ne_bytes([msg[0], msg[1], msg[2], msg[3]]), 40);
        assert_eq!(u16::from_ne_bytes([msg[4], msg[5]]), 0x0301);

        // nfgenmsg: AF_UNSPEC, version 0, queue 1 big-endian
        assert_eq!(&msg[16..20], &[0, 0, 0, 1]);

        // Verdict header attribute: NF_REPEAT then the packet id
        assert_eq!(&msg[24..28], &(VerdictKind::Repeat as u32).to_be_bytes());
        assert_eq!(&msg[28..32], &42u32.to_be_bytes());

        // Mark attribute
        assert_eq!(u16::from_ne_bytes([msg[34], msg[35]]), NFQA_MARK);
        assert_eq!(&msg[36..40], &2u32.to_be_bytes());
    }

    #[test]
    fn test_verdict_message_without_mark() {
        let verdict = Verdict {
            kind: VerdictKind::Accept,
            mark: None,
        };
        let msg = build_verdict_message(0, 1, 7, verdict);
        assert_eq!(msg.len(), 32);
        assert_eq!(&msg[24..28], &1u32.to_be_bytes());
    }

    fn packet_message() -> Vec<u8> {
        let mut hdr_data = [0u8; 7];
        hdr_data[..4].copy_from_slice(&99u32.to_be_bytes()); // packet id
        hdr_data[4..6].copy_from_slice(&0x0800u16.to_be_bytes()); // hw proto

        let mut attrs = nlattr(NFQA_PACKET_HDR, &hdr_data);
        attrs.extend_from_slice(&nlattr(NFQA_MARK, &5u32.to_be_bytes()));
        attrs.extend_from_slice(&nlattr(NFQA_IFINDEX_INDEV, &2u32.to_be_bytes()));
        attrs.extend_from_slice(&nlattr(NFQA_IFINDEX_OUTDEV, &3u32.to_be_bytes()));
        attrs.extend_from_slice(&nlattr(NFQA_PAYLOAD, &[0xde, 0xad, 0xbe, 0xef, 0x01]));

        let msg_type = (NFNL_SUBSYS_QUEUE << 8) | NFQNL_MSG_PACKET;
        let mut msg = nlmsghdr(NFGENMSG_LEN + attrs.len(), msg_type, 0, 0);
        msg.extend_from_slice(&nfgenmsg(libc::AF_UNSPEC as u8, 0));
        msg.extend_from_slice(&attrs);
        msg
    }

    #[test]
    fn test_parse_packet_message() {
        let packet = parse_message(&packet_message()).unwrap().unwrap();

        assert_eq!(packet.id, 99);
        assert_eq!(packet.mark, 5);
        assert_eq!(packet.indev, 2);
        assert_eq!(packet.outdev, 3);
        assert_eq!(packet.physindev, 0);
        assert_eq!(packet.physoutdev, 0);
        assert_eq!(packet.data, vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
    }

    #[test]
    fn test_parse_ack_is_not_a_packet() {
        // NLMSG_ERROR with errno 0 is an ack
        let mut msg = nlmsghdr(4, NLMSG_ERROR, 0, 1);
        msg.extend_from_slice(&0i32.to_ne_bytes());
        assert!(parse_message(&msg).unwrap().is_none());
    }

    #[test]
    fn test_parse_netlink_failure() {
        // NLMSG_ERROR carrying -EPERM
        let mut msg = nlmsghdr(4, NLMSG_ERROR, 0, 1);
        msg.extend_from_slice(&(-libc::EPERM).to_ne_bytes());
        assert!(parse_message(&msg).is_err());
    }

    #[test]
    fn test_parse_ignores_foreign_message() {
        let msg = nlmsghdr(0, 0x0102, 0, 1);
        assert!(parse_message(&msg).unwrap().is_none());
    }

    #[test]
    fn test_parse_short_buffer() {
        assert!(parse_message(&[0, 1, 2]).unwrap().is_none());
    }
}
