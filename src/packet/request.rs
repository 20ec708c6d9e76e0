use pnet::packet::{
    icmp::{echo_request::MutableEchoRequestPacket, IcmpTypes},
    icmpv6::{Icmpv6Types, MutableIcmpv6Packet},
    Packet,
};
use pnet::util::checksum;

use super::{CodecError, ECHO_HEADER_LEN, PAYLOAD_LEN};
use crate::Family;

/// A probe before send-out
///
/// Low-level abstraction for outgoing echo request messages. The layout is the same for both
/// families: type, code, checksum, identifier, sequence number, then the 8-byte timestamp.
#[derive(Debug)]
pub enum EchoRequest {
    Icmp(MutableEchoRequestPacket<'static>),
    Icmpv6(MutableIcmpv6Packet<'static>),
}

impl EchoRequest {
    /// Build a complete Echo Request
    ///
    /// The type is 8 for ICMP/IPv4 and 128 for ICMPv6/IPv6, the code is left zeroed. The payload is
    /// the little-endian encoding of `sent_nanos`, which the destination echoes back unchanged.
    ///
    /// Only the ICMPv4 checksum is computed here. The ICMPv6 checksum covers a pseudo header with
    /// the source address, so the kernel fills it in for raw ICMPv6 sockets.
    ///
    /// # Errors
    ///
    /// Fails only if the buffer were smaller than the minimum packet size, which the fixed layout
    /// rules out.
    pub fn new(
        family: Family,
        identifier: u16,
        sequence: u16,
        sent_nanos: i64,
    ) -> Result<Self, CodecError> {
        let payload = sent_nanos.to_le_bytes();
        let len = ECHO_HEADER_LEN + PAYLOAD_LEN;
        let too_small = CodecError::Truncated {
            needed: ECHO_HEADER_LEN,
            actual: len,
        };
        let buffer = vec![0u8; len];

        match family {
            Family::V4 => {
                let mut pkg = MutableEchoRequestPacket::owned(buffer).ok_or(too_small)?;
                pkg.set_icmp_type(IcmpTypes::EchoRequest);
                pkg.set_identifier(identifier);
                pkg.set_sequence_number(sequence);
                pkg.set_payload(&payload);
                pkg.set_checksum(checksum(pkg.packet(), 1));
                Ok(Self::Icmp(pkg))
            }
            Family::V6 => {
                let mut pkg = MutableIcmpv6Packet::owned(buffer).ok_or(too_small)?;
                pkg.set_icmpv6_type(Icmpv6Types::EchoRequest);
                let body = [
                    &identifier.to_be_bytes()[..],
                    &sequence.to_be_bytes()[..],
                    &payload[..],
                ]
                .concat();
                pkg.set_payload(&body);
                Ok(Self::Icmpv6(pkg))
            }
        }
    }
}

impl Packet for EchoRequest {
    fn packet(&self) -> &[u8] {
        match self {
            Self::Icmp(pkg) => pkg.packet(),
            Self::Icmpv6(pkg) => pkg.packet(),
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Icmp(pkg) => pkg.payload(),
            Self::Icmpv6(pkg) => pkg.payload(),
        }
    }
}
