use pnet::packet::Packet;
use std::net::IpAddr;

use crate::error::ProbeError;
use crate::packet::{now_nanos, EchoRequest};
use crate::transport::Transport;
use crate::Family;

/// Emitter of Echo Requests
///
/// Owns the sequence counter, which starts at 1 and moves on by exactly one per transmitted probe.
/// Sending only ever happens on the session's thread, so the counter needs no synchronisation.
#[derive(Debug)]
pub struct Sender {
    dest: IpAddr,
    family: Family,
    identifier: u16,
    sequence: u16,
}

impl Sender {
    pub fn new(dest: IpAddr, identifier: u16) -> Self {
        Self {
            dest,
            family: Family::of(&dest),
            identifier,
            sequence: 1,
        }
    }

    /// Sequence number the next probe will carry
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Send one Echo Request
    ///
    /// The request is timestamped right before it is handed to the transport. Returns the sequence
    /// number that went out.
    ///
    /// # Errors
    ///
    /// A failed transmit is returned as is and leaves the counter untouched. The session treats it
    /// as fatal.
    pub fn tick<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<u16, ProbeError> {
        let seq = self.sequence;
        let probe = EchoRequest::new(self.family, self.identifier, seq, now_nanos())?;
        transport.send(probe.packet(), self.dest)?;

        trace!("Sent echo request icmp_seq={} to {}", seq, self.dest);

        // Wrapping is out of reach for sessions of realistic length
        self.sequence = self.sequence.wrapping_add(1);
        Ok(seq)
    }
}
