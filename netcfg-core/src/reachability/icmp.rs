//! ICMP echo over an unprivileged datagram socket, falling back to a raw socket.

use crate::traits::{PingReply, Pinger};
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::os::fd::FromRawFd;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_HEADER_LEN: usize = 8;
const PAYLOAD: &[u8; 16] = b"netcfg-reachable";

/// RFC 1071 internet checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; ICMP_HEADER_LEN];
    buf[0] = ICMP_ECHO_REQUEST;
    buf[4..6].copy_from_slice(&identifier.to_be_bytes());
    buf[6..8].copy_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(payload);
    let sum = checksum(&buf);
    buf[2..4].copy_from_slice(&sum.to_be_bytes());
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
    pub ttl: Option<u8>,
}

/// Parses an echo reply. Raw sockets deliver the IPv4 header in front of
/// the ICMP message, datagram sockets do not.
pub fn parse_echo_reply(packet: &[u8]) -> Option<EchoReply> {
    let (icmp, ttl) = match packet.first() {
        Some(b) if b >> 4 == 4 => {
            let ihl = usize::from(b & 0x0f) * 4;
            if ihl < 20 || packet.len() < ihl + ICMP_HEADER_LEN {
                return None;
            }
            (&packet[ihl..], Some(packet[8]))
        }
        _ => (packet, None),
    };
    if icmp.len() < ICMP_HEADER_LEN || icmp[0] != ICMP_ECHO_REPLY || icmp[1] != 0 {
        return None;
    }
    Some(EchoReply {
        identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
        sequence: u16::from_be_bytes([icmp[6], icmp[7]]),
        ttl,
    })
}

/// `Pinger` backed by a kernel ICMP socket.
#[derive(Debug)]
pub struct IcmpPinger {
    identifier: u16,
}

impl IcmpPinger {
    pub fn new() -> Self {
        Self {
            identifier: (std::process::id() & 0xffff) as u16,
        }
    }

    /// Returns the socket and whether it is a raw socket.
    fn open_socket() -> Result<(UdpSocket, bool)> {
        let flags = libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;
        // SAFETY: socket(2) takes no pointers; a negative return is checked below.
        let (fd, raw) = unsafe {
            let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM | flags, libc::IPPROTO_ICMP);
            if fd >= 0 {
                (fd, false)
            } else {
                (
                    libc::socket(libc::AF_INET, libc::SOCK_RAW | flags, libc::IPPROTO_ICMP),
                    true,
                )
            }
        };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by socket(2), is non-negative and is
        // owned by nothing else, so the std socket becomes its only owner.
        let std_socket = unsafe { std::net::UdpSocket::from_raw_fd(fd) };
        Ok((UdpSocket::from_std(std_socket)?, raw))
    }
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn echo(
        &self,
        destination: IpAddr,
        sequence: u16,
        timeout: Duration,
    ) -> Result<Option<PingReply>> {
        if !destination.is_ipv4() {
            return Err(Error::Icmp(format!("{destination}: only IPv4 is supported")));
        }
        let (socket, raw) = Self::open_socket()?;
        let packet = build_echo_request(self.identifier, sequence, PAYLOAD);

        let started = Instant::now();
        socket.send_to(&packet, SocketAddr::new(destination, 0)).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = [0u8; 1500];
        loop {
            let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(res) => res?,
                Err(_) => return Ok(None),
            };
            if from.ip() != destination {
                continue;
            }
            let Some(reply) = parse_echo_reply(&buf[..len]) else {
                continue;
            };
            // 数据报套接字由内核改写 identifier，只有原始套接字需要比对
            if reply.sequence != sequence || (raw && reply.identifier != self.identifier) {
                continue;
            }
            return Ok(Some(PingReply {
                destination,
                sequence,
                rtt: started.elapsed(),
                ttl: reply.ttl,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_checksum_verifies_to_zero() {
        let packet = build_echo_request(0x1234, 7, PAYLOAD);
        assert_eq!(packet[0], ICMP_ECHO_REQUEST);
        assert_eq!(packet.len(), ICMP_HEADER_LEN + PAYLOAD.len());
        assert_eq!(checksum(&packet), 0);
    }

    #[test]
    fn checksum_handles_odd_length() {
        let data = [0x45, 0x00, 0x01];
        // 0x4500 + 0x0100 = 0x4600
        assert_eq!(checksum(&data), !0x4600);
    }

    fn reply_from(request: &[u8]) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = ICMP_ECHO_REPLY;
        reply[2] = 0;
        reply[3] = 0;
        let sum = checksum(&reply);
        reply[2..4].copy_from_slice(&sum.to_be_bytes());
        reply
    }

    #[test]
    fn parses_datagram_reply() {
        let reply = reply_from(&build_echo_request(42, 3, PAYLOAD));
        let parsed = parse_echo_reply(&reply).unwrap();
        assert_eq!(parsed.identifier, 42);
        assert_eq!(parsed.sequence, 3);
        assert_eq!(parsed.ttl, None);
    }

    #[test]
    fn parses_raw_reply_with_ip_header() {
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[8] = 57;
        packet.extend(reply_from(&build_echo_request(42, 9, PAYLOAD)));
        let parsed = parse_echo_reply(&packet).unwrap();
        assert_eq!(parsed.sequence, 9);
        assert_eq!(parsed.ttl, Some(57));
    }

    #[test]
    fn rejects_requests_and_truncated_packets() {
        assert!(parse_echo_reply(&build_echo_request(1, 1, PAYLOAD)).is_none());
        assert!(parse_echo_reply(&[0, 0, 0]).is_none());
        assert!(parse_echo_reply(&[0x45, 0, 0, 0]).is_none());
    }

    #[tokio::test]
    async fn socket_is_usable_or_reports_os_error() {
        // 沙箱里可能没有 ICMP 权限，此时只要求返回 Io 错误
        match IcmpPinger::open_socket() {
            Ok((socket, _raw)) => assert!(socket.local_addr().is_ok()),
            Err(e) => assert!(matches!(e, Error::Io(_)), "unexpected error: {e}"),
        }
    }
}
