//! Message codec
//!
//! Outgoing Echo Requests are built by [`EchoRequest`]. Inbound datagrams are classified once by
//! [`decode`] into a [`Decoded`] value, so consumers never look at ICMP type numbers themselves.

use pnet::packet::{
    icmp::{IcmpPacket, IcmpType},
    icmpv6::{Icmpv6Packet, Icmpv6Type},
};
use pnet::util::checksum;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::receiver::InboundEvent;
use crate::Family;

pub use request::EchoRequest;

mod request;

/// Type, code and checksum
pub const ICMP_HEADER_LEN: usize = 4;

/// Common ICMP header plus identifier and sequence number
pub const ECHO_HEADER_LEN: usize = 8;

/// Send timestamp carried as payload
pub const PAYLOAD_LEN: usize = 8;

/// A datagram that could not be parsed as an ICMP message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated message: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("bad checksum: expected {expected:#06x}, got {actual:#06x}")]
    Checksum { expected: u16, actual: u16 },
}

/// Classification of an inbound ICMP message
///
/// Decided once during decoding. `Ignored` covers every message type this probe does not track,
/// including our own Echo Requests looping back on the raw socket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decoded {
    Reply {
        identifier: u16,
        sequence: u16,
        round_trip_nanos: i64,
    },
    Expired,
    Ignored,
}

impl Decoded {
    /// Turn this message into an event for the session identified by `identifier`
    ///
    /// Echo Replies to other processes on the host come back as `None`, like ignored messages.
    /// Time Exceeded messages cannot be attributed to any session and always pass.
    pub fn into_event(self, identifier: u16) -> Option<InboundEvent> {
        match self {
            Decoded::Reply {
                identifier: id,
                sequence,
                round_trip_nanos,
            } if id == identifier => Some(InboundEvent::Reply {
                sequence,
                round_trip_nanos,
            }),
            Decoded::Reply { .. } | Decoded::Ignored => None,
            Decoded::Expired => Some(InboundEvent::Expired),
        }
    }
}

/// ICMP message types tracked by the probe
///
/// Mapping from pnet's `IcmpTypes`/`Icmpv6Types`, where the numbering differs per family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MessageKind {
    EchoReply,
    TimeExceeded,

    // Catch-all for all types that we do not keep track of
    Other,
}

#[allow(non_upper_case_globals)]
impl From<IcmpType> for MessageKind {
    fn from(ty: IcmpType) -> Self {
        use pnet::packet::icmp::IcmpTypes::*;
        match ty {
            EchoReply => Self::EchoReply,
            TimeExceeded => Self::TimeExceeded,
            _ => Self::Other,
        }
    }
}

#[allow(non_upper_case_globals)]
impl From<Icmpv6Type> for MessageKind {
    fn from(ty: Icmpv6Type) -> Self {
        use pnet::packet::icmpv6::Icmpv6Types::*;
        match ty {
            EchoReply => Self::EchoReply,
            TimeExceeded => Self::TimeExceeded,
            _ => Self::Other,
        }
    }
}

/// Current time as nanoseconds since the UNIX epoch
///
/// Only ever compared against itself, so a clock set before the epoch simply reads as zero.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Classify an inbound ICMP message, measuring round trips against the current time
pub fn decode(bytes: &[u8], family: Family) -> Result<Decoded, CodecError> {
    decode_at(bytes, family, now_nanos())
}

/// Classify an inbound ICMP message, measuring round trips against `now`
///
/// `bytes` starts at the ICMP header. Echo Replies yield the identifier, sequence number and the
/// time elapsed since the timestamp embedded in the payload.
///
/// # Errors
///
/// Returns a `CodecError` if the buffer is shorter than the ICMP header, an Echo Reply is too short
/// to carry the timestamp, or an ICMPv4 checksum does not match.
pub fn decode_at(bytes: &[u8], family: Family, now: i64) -> Result<Decoded, CodecError> {
    let truncated = |needed| CodecError::Truncated {
        needed,
        actual: bytes.len(),
    };

    let kind = match family {
        Family::V4 => {
            let pkg = IcmpPacket::new(bytes).ok_or_else(|| truncated(ICMP_HEADER_LEN))?;
            let expected = checksum(bytes, 1);
            if expected != pkg.get_checksum() {
                return Err(CodecError::Checksum {
                    expected,
                    actual: pkg.get_checksum(),
                });
            }
            MessageKind::from(pkg.get_icmp_type())
        }
        Family::V6 => {
            let pkg = Icmpv6Packet::new(bytes).ok_or_else(|| truncated(ICMP_HEADER_LEN))?;
            MessageKind::from(pkg.get_icmpv6_type())
        }
    };

    match kind {
        MessageKind::EchoReply => {
            if bytes.len() < ECHO_HEADER_LEN + PAYLOAD_LEN {
                return Err(truncated(ECHO_HEADER_LEN + PAYLOAD_LEN));
            }
            let mut stamp = [0u8; PAYLOAD_LEN];
            stamp.copy_from_slice(&bytes[ECHO_HEADER_LEN..ECHO_HEADER_LEN + PAYLOAD_LEN]);
            let sent = i64::from_le_bytes(stamp);

            Ok(Decoded::Reply {
                identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
                sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
                round_trip_nanos: now.saturating_sub(sent),
            })
        }
        MessageKind::TimeExceeded => Ok(Decoded::Expired),
        MessageKind::Other => Ok(Decoded::Ignored),
    }
}

/// Test helpers shared with the transport and session tests
#[cfg(test)]
pub(crate) mod testing {
    use pnet::util::checksum;

    use crate::Family;

    /// Turn an Echo Request into the Echo Reply a destination would send
    pub fn reply_to(request: &[u8], family: Family) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = match family {
            Family::V4 => 0,
            Family::V6 => 129,
        };
        seal(&mut reply, family);
        reply
    }

    /// Build the Time Exceeded message a router would send for `request`
    pub fn time_exceeded_for(request: &[u8], family: Family) -> Vec<u8> {
        let ty = match family {
            Family::V4 => 11,
            Family::V6 => 3,
        };
        let mut message = vec![ty, 0, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(request);
        seal(&mut message, family);
        message
    }

    fn seal(message: &mut [u8], family: Family) {
        if family == Family::V4 {
            let sum = checksum(message, 1).to_be_bytes();
            message[2..4].copy_from_slice(&sum);
        }
    }
}
