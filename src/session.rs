//! Session coordinator
//!
//! The `Session` is the only consumer of inbound events and the only owner of the statistics. It
//! multiplexes three sources on one thread: events from the receiver loop, ticks of the send timer
//! and the cancellation signal.

use crossbeam::channel::{self, Receiver as ChannelReceiver, Sender as ChannelSender};
use crossbeam::select;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProbeError;
use crate::packet::PAYLOAD_LEN;
use crate::receiver::{InboundEvent, Receiver};
use crate::sender::Sender;
use crate::stats::{SessionStats, Summary};
use crate::transport::Transport;
use crate::Family;

const NANOS_PER_MILLI: f64 = 1_000_000f64;

/// Requests termination of a running session
///
/// Cloneable and safe to trigger from a signal handler. Triggering more than once has no further
/// effect.
#[derive(Debug, Clone)]
pub struct Canceller(ChannelSender<()>);

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.0.try_send(());
    }
}

/// Observes termination requests inside the session
#[derive(Debug)]
pub struct CancelToken(ChannelReceiver<()>);

/// Create a linked cancellation pair
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = channel::bounded(1);
    (Canceller(tx), CancelToken(rx))
}

/// Timer source firing every `interval`, starting one interval from now
pub fn ticker(interval: Duration) -> ChannelReceiver<Instant> {
    channel::tick(interval)
}

/// Coordinator of one probe session against a single destination
pub struct Session<T> {
    transport: Arc<T>,
    host: String,
    dest: IpAddr,
    identifier: u16,
    sender: Sender,
    stats: SessionStats,
}

impl<T: Transport + 'static> Session<T> {
    /// Set up a session on an opened transport
    ///
    /// `host` is only used for display, all traffic goes to `dest`.
    pub fn new(transport: T, host: String, dest: IpAddr, identifier: u16) -> Self {
        Self {
            transport: Arc::new(transport),
            host,
            dest,
            identifier,
            sender: Sender::new(dest, identifier),
            stats: SessionStats::new(),
        }
    }

    /// Run the session until cancellation
    ///
    /// Spawns the receiver loop, then sends one probe per tick and reports every event on `out`.
    /// On termination the transport is closed, the receiver loop is joined and the summary is
    /// written exactly once, whichever path ended the session.
    ///
    /// A closed tick source ends the session like a cancellation.
    ///
    /// # Errors
    ///
    /// A failed send, a failed write to `out`, or a receiver loop that stops on its own ends the
    /// session with the corresponding error, after the summary has been written.
    pub fn run<W: Write>(
        mut self,
        ticks: ChannelReceiver<Instant>,
        cancel: CancelToken,
        out: &mut W,
    ) -> Result<Summary, ProbeError> {
        let family = Family::of(&self.dest);
        self.stats = SessionStats::new();
        writeln!(
            out,
            "PROBE {} ({}): {} data bytes",
            self.host, self.dest, PAYLOAD_LEN
        )
        .map_err(ProbeError::Output)?;

        trace!("Start up new receiver");

        let (events_tx, events) = channel::unbounded();
        let listener =
            Receiver::new(self.transport.clone(), family, self.identifier, events_tx).spawn();

        let outcome = loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if let Err(e) = self.observe(event, out) {
                            break Err(e);
                        }
                    }
                    Err(_) => break Err(ProbeError::ListenerStopped),
                },
                recv(ticks) -> tick => match tick {
                    Ok(_) => {
                        if let Err(e) = self.send_probe() {
                            warn!("Error occurred during send of echo request - shutting down");
                            break Err(e);
                        }
                    }
                    Err(_) => {
                        trace!("Timer stopped");
                        break Ok(());
                    }
                },
                recv(cancel.0) -> _ => {
                    trace!("Registered termination request");
                    break Ok(());
                },
            }
        };

        // Elapsed time stops here, shutting down the receiver is not part of the session
        let summary = self.stats.summarize();

        // Closing unblocks the receiver, anything it still publishes is discarded with the channel
        self.transport.close();
        drop(events);
        if listener.join().is_err() {
            error!("Listening thread panicked");
        }

        trace!("Successfully shut down listening thread");

        self.report_summary(&summary, out)?;
        outcome.map(|_| summary)
    }

    fn send_probe(&mut self) -> Result<(), ProbeError> {
        self.sender.tick(self.transport.as_ref())?;
        self.stats.record_sent();
        Ok(())
    }

    fn observe<W: Write>(&mut self, event: InboundEvent, out: &mut W) -> Result<(), ProbeError> {
        match event {
            InboundEvent::Reply {
                sequence,
                round_trip_nanos,
            } => {
                self.stats.record_reply(round_trip_nanos);
                writeln!(
                    out,
                    "reply from {}: icmp_seq={} time={:.1} ms",
                    self.dest,
                    sequence,
                    round_trip_nanos as f64 / NANOS_PER_MILLI
                )
            }
            InboundEvent::Expired => {
                self.stats.record_expired();
                writeln!(out, "time to live exceeded")
            }
        }
        .map_err(ProbeError::Output)
    }

    fn report_summary<W: Write>(&self, summary: &Summary, out: &mut W) -> Result<(), ProbeError> {
        writeln!(out).map_err(ProbeError::Output)?;
        writeln!(out, "--- {} probe statistics ---", self.host).map_err(ProbeError::Output)?;
        writeln!(out, "{}", summary).map_err(ProbeError::Output)?;
        if let Some(rtt) = summary.rtt {
            writeln!(out, "{}", rtt).map_err(ProbeError::Output)?;
        }
        out.flush().map_err(ProbeError::Output)
    }
}
