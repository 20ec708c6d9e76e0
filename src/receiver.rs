use crossbeam::channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::packet;
use crate::transport::Transport;
use crate::Family;

/// Pause after a failed receive, so a broken socket does not spin
pub const RECEIVE_BACKOFF: Duration = Duration::from_millis(50);

/// Outcome of a probe as observed by the receiver
///
/// Time Exceeded messages carry no recoverable sequence number, so an `Expired` event cannot be
/// attributed to a particular probe.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Reply {
        sequence: u16,
        round_trip_nanos: i64,
    },
    Expired,
}

/// Background listener for inbound ICMP messages
///
/// Reads from the shared `Transport`, classifies each datagram and publishes an `InboundEvent` for
/// every reply to this process and every Time Exceeded message. The loop stops when the transport
/// is closed or when nobody listens on the event channel any more.
pub struct Receiver<T> {
    transport: Arc<T>,
    family: Family,
    identifier: u16,
    events: Sender<InboundEvent>,
}

impl<T: Transport + 'static> Receiver<T> {
    pub fn new(
        transport: Arc<T>,
        family: Family,
        identifier: u16,
        events: Sender<InboundEvent>,
    ) -> Self {
        Self {
            transport,
            family,
            identifier,
            events,
        }
    }

    /// Run the receiver loop on its own thread
    ///
    /// Returns the handle to the listener thread for joining.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.listen())
    }

    /// Main listening loop
    ///
    /// Malformed datagrams are logged and dropped. Receive faults other than closing are logged and
    /// the loop keeps listening, since the session decides when to give up.
    pub fn listen(self) {
        trace!("Start listening thread for incoming {} messages", self.family);

        let mut failures = 0u32;

        loop {
            let (datagram, peer) = match self.transport.receive() {
                Ok(received) => received,
                Err(ref e) if e.is_closed() => break,
                Err(e) => {
                    if failures == 0 {
                        error!("Error occurred while reading incoming: {}", e);
                    } else {
                        debug!("Reading incoming failed again ({}): {}", failures + 1, e);
                    }
                    failures = failures.saturating_add(1);
                    thread::sleep(RECEIVE_BACKOFF);
                    continue;
                }
            };
            if failures > 0 {
                info!("Reading incoming recovered after {} failures", failures);
                failures = 0;
            }

            let decoded = match packet::decode(&datagram, self.family) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("Dropping datagram from {}: {}", peer, e);
                    continue;
                }
            };

            if let Some(event) = decoded.into_event(self.identifier) {
                trace!("Received {:?} from {}", event, peer);

                if self.events.send(event).is_err() {
                    trace!("Event channel disconnected");
                    break;
                }
            }
        }

        trace!("Shutting down listening thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::testing::reply_to;
    use crate::packet::{now_nanos, EchoRequest};
    use crate::transport::loopback::Loopback;
    use crossbeam::channel;
    use pnet::packet::Packet;

    const ID: u16 = 0x4242;

    fn reply(family: Family, identifier: u16, sequence: u16) -> Vec<u8> {
        let request = EchoRequest::new(family, identifier, sequence, now_nanos()).unwrap();
        reply_to(request.packet(), family)
    }

    #[test]
    fn malformed_datagram_does_not_stop_the_loop() {
        let transport = Arc::new(Loopback::new("127.0.0.1".parse().unwrap()));
        let (tx, rx) = channel::unbounded();
        let handle = Receiver::new(transport.clone(), Family::V4, ID, tx).spawn();

        // Truncated ICMP header, then a valid reply
        transport.inject(vec![0, 0]);
        transport.inject(reply(Family::V4, ID, 5));

        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(InboundEvent::Reply {
                sequence,
                round_trip_nanos,
            }) => {
                assert_eq!(sequence, 5);
                assert!(round_trip_nanos >= 0);
            }
            other => panic!("expected reply, got {:?}", other),
        }

        transport.close();
        handle.join().expect("Listening thread panicked");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn foreign_and_ignored_messages_are_not_published() {
        let transport = Arc::new(Loopback::new("::1".parse().unwrap()));
        let (tx, rx) = channel::unbounded();
        let handle = Receiver::new(transport.clone(), Family::V6, ID, tx).spawn();

        // Another process' reply and one of our own requests
        transport.inject(reply(Family::V6, ID + 1, 1));
        transport.inject(EchoRequest::new(Family::V6, ID, 2, 0).unwrap().packet().to_vec());
        transport.inject(reply(Family::V6, ID, 3));

        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(InboundEvent::Reply { sequence, .. }) => assert_eq!(sequence, 3),
            other => panic!("expected reply, got {:?}", other),
        }

        transport.close();
        handle.join().expect("Listening thread panicked");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failing_receives_back_off_and_recover() {
        let transport = Arc::new(Loopback::new("127.0.0.1".parse().unwrap()));
        transport.fail_receives(true);
        let (tx, rx) = channel::unbounded();
        let handle = Receiver::new(transport.clone(), Family::V4, ID, tx).spawn();

        thread::sleep(Duration::from_millis(300));
        let attempts = transport.receive_count();
        assert!(attempts >= 1);
        assert!(attempts <= 10, "{} receive attempts in 300ms", attempts);

        transport.fail_receives(false);
        transport.inject(reply(Family::V4, ID, 2));
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(InboundEvent::Reply { sequence, .. }) => assert_eq!(sequence, 2),
            other => panic!("expected reply, got {:?}", other),
        }

        transport.close();
        handle.join().expect("Listening thread panicked");
    }

    #[test]
    fn stops_when_events_are_no_longer_consumed() {
        let transport = Arc::new(Loopback::new("127.0.0.1".parse().unwrap()));
        let (tx, rx) = channel::unbounded();
        drop(rx);

        transport.inject(reply(Family::V4, ID, 1));
        Receiver::new(transport.clone(), Family::V4, ID, tx)
            .spawn()
            .join()
            .expect("Listening thread panicked");
        assert_eq!(transport.close_count(), 0);
    }
}
