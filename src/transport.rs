//! Raw ICMP transport
//!
//! A raw socket cannot be woken from another thread by closing it. Instead the socket gets a short
//! read timeout and `receive` checks a shared closed flag every time the timeout fires, so closing
//! the transport unblocks a pending receive within one poll interval.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::ProbeError;
use crate::Family;

/// Largest datagram read from the socket
pub const MAX_PACKET_SIZE: usize = 1500;

/// How often a blocked receive wakes up to check whether the transport was closed
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Datagram channel for ICMP messages
///
/// Shared between the session, which sends and closes, and the receiver loop, which receives.
pub trait Transport: Send + Sync {
    /// Send one ICMP message to `dest`
    fn send(&self, packet: &[u8], dest: IpAddr) -> Result<(), ProbeError>;

    /// Block until an ICMP message arrives
    ///
    /// Returns the message starting at its ICMP header, along with the peer address. Returns
    /// `ProbeError::Closed` once the transport has been closed.
    fn receive(&self) -> Result<(Vec<u8>, IpAddr), ProbeError>;

    /// Close the transport, unblocking any pending receive
    ///
    /// Closing more than once has no further effect.
    fn close(&self);
}

/// Raw ICMP socket for one address family
#[derive(Debug)]
pub struct IcmpSocket {
    socket: Socket,
    family: Family,
    closed: AtomicBool,
    sent: AtomicBool,
}

impl IcmpSocket {
    /// Open a raw socket for `family` and apply the TTL or hop limit
    ///
    /// # Errors
    ///
    /// Opening a raw socket usually requires elevated privileges. If the operating system denies
    /// the socket, this returns `ProbeError::Transport`. If the TTL or hop limit cannot be applied,
    /// this returns `ProbeError::Config`.
    pub fn open(family: Family, ttl: u8) -> Result<Self, ProbeError> {
        trace!("Opening raw {} socket", family);

        let (domain, protocol) = match family {
            Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
            Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket =
            Socket::new(domain, Type::RAW, Some(protocol)).map_err(ProbeError::Transport)?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(ProbeError::Transport)?;

        let transport = Self {
            socket,
            family,
            closed: AtomicBool::new(false),
            sent: AtomicBool::new(false),
        };
        transport.set_hop_limit(ttl)?;
        Ok(transport)
    }

    /// Set the IPv4 TTL or the IPv6 unicast hop limit
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if called after the first send, or if the operating system
    /// rejects the option.
    pub fn set_hop_limit(&self, ttl: u8) -> Result<(), ProbeError> {
        if self.sent.load(Ordering::SeqCst) {
            return Err(ProbeError::Config(io::Error::new(
                io::ErrorKind::Other,
                "hop limit cannot change once probes are in flight",
            )));
        }

        info!("Set {}: {}", hop_option_name(self.family), ttl);

        match self.family {
            Family::V4 => self.socket.set_ttl(u32::from(ttl)),
            Family::V6 => self.socket.set_unicast_hops_v6(u32::from(ttl)),
        }
        .map_err(ProbeError::Config)
    }

    /// Return `true` once `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for IcmpSocket {
    fn send(&self, packet: &[u8], dest: IpAddr) -> Result<(), ProbeError> {
        self.sent.store(true, Ordering::SeqCst);
        let addr = SockAddr::from(SocketAddr::new(dest, 0));
        self.socket
            .send_to(packet, &addr)
            .map(|_| ())
            .map_err(ProbeError::Transport)
    }

    fn receive(&self) -> Result<(Vec<u8>, IpAddr), ProbeError> {
        let mut buf = [MaybeUninit::<u8>::uninit(); MAX_PACKET_SIZE];

        loop {
            if self.is_closed() {
                return Err(ProbeError::Closed);
            }

            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    // SAFETY: `recv_from` initialized the first `len` bytes of the buffer
                    let datagram: Vec<u8> = buf[..len]
                        .iter()
                        .map(|byte| unsafe { byte.assume_init() })
                        .collect();
                    let peer = peer
                        .as_socket()
                        .map(|addr| addr.ip())
                        .ok_or_else(|| {
                            ProbeError::Transport(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "peer is not an IP address",
                            ))
                        })?;
                    let message = match self.family {
                        Family::V4 => strip_ipv4_header(&datagram),
                        Family::V6 => &datagram[..],
                    };
                    return Ok((message.to_vec(), peer));
                }

                // Read timeout expired, check whether we are still open
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::Interrupted => {}

                Err(e) if self.is_closed() => {
                    trace!("Discarding receive error after close: {}", e);
                    return Err(ProbeError::Closed);
                }
                Err(e) => return Err(ProbeError::Transport(e)),
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            trace!("Closed {} transport", self.family);
        }
    }
}

fn hop_option_name(family: Family) -> &'static str {
    match family {
        Family::V4 => "time to live",
        Family::V6 => "hop limit",
    }
}

/// Skip the IPv4 header that raw IPv4 sockets deliver in front of the ICMP message
///
/// A datagram too short for its own header length is handed on unchanged, for the codec to
/// reject.
pub fn strip_ipv4_header(datagram: &[u8]) -> &[u8] {
    match datagram.first() {
        Some(first) if first >> 4 == 4 => {
            let ihl = usize::from(first & 0x0f) * 4;
            if ihl >= 20 && datagram.len() >= ihl {
                &datagram[ihl..]
            } else {
                datagram
            }
        }
        _ => datagram,
    }
}
