//! # PROBE round-trip latency probe
//!
//! This crate provides the components of an ICMP Echo latency probe. It consists of:
//! - The `Transport`, owning one raw ICMP socket for the destination's address family
//! - The codec in `packet`, which builds Echo Requests and classifies inbound ICMP messages
//! - The receiver loop, which runs on its own thread and turns datagrams into `InboundEvent`s
//! - The `Sender`, which emits one Echo Request per timer tick
//! - The `Session`, which multiplexes events, ticks and cancellation and keeps the statistics
//!
//! Requests are never stored. Every Echo Request carries its send timestamp in the payload, the
//! destination echoes it back, and the receiver computes the round-trip time on its own.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

pub mod cli;
pub mod dest;
pub mod error;
pub mod logger;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::ProbeError;

/// Application configuration
///
/// The `Config` is produced by the command line parser and consumed by `main`.
#[derive(Debug)]
pub struct Config {
    pub ttl: u8,
    pub interval: Duration,
    pub target: Target,
    pub family: Option<Family>,
}

/// Destination as given by the user
///
/// Either an IP literal or a host name, which still has to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Ip(IpAddr),
    Host(String),
}

/// IP version of a probe session
///
/// Selected once from the resolved destination. ICMP type numbering differs between the two.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// Identifier placed in every Echo Request of this process
///
/// The lower 16 bits of the process id.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}
