//! Discrete-Event Simulation Engine.
//!
//! Everything in the simulator advances through timed events popped off a
//! single ordered queue: datagram deliveries, retransmission timeouts, page
//! deadlines. There is no wall clock, no threads, and no blocking call —
//! suspension is expressed only by scheduling a future event.
//!
//! Ordering guarantees:
//!
//! - Events fire in timestamp order; events with equal timestamps fire in
//!   the order they were scheduled.
//! - A canceled timer never fires. Handlers that race a cancellation (an
//!   ACK removing an in-flight record while its timeout is queued) must
//!   additionally re-validate their target by key at fire time.

mod network;
mod scheduler;

pub use network::{EndpointId, LinkConfig, Network};
pub use scheduler::{Scheduler, SimTime, TimerId};

use bytes::Bytes;

/// A timed event in the simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A datagram arriving at `dst` after traversing the link.
    Datagram {
        /// Sending endpoint
        src: EndpointId,
        /// Receiving endpoint
        dst: EndpointId,
        /// Raw frame bytes
        payload: Bytes,
    },
    /// Retransmission timeout for packet `seq` on the channel that
    /// `owner` keeps toward `peer`.
    Rto {
        /// Endpoint owning the channel
        owner: EndpointId,
        /// Remote endpoint of the channel
        peer: EndpointId,
        /// Packet sequence number the timer was armed for
        seq: u32,
    },
    /// Deadline for an entire page of requests.
    PageDeadline {
        /// Index of the page the deadline was armed for
        page: usize,
    },
    /// Deferred advance to the next page.
    NextPage,
}

/// The simulation context: virtual clock, event queue, and the lossy
/// datagram link between endpoints.
///
/// Channels and peers receive `&mut Sim` in their event entry points and
/// use it to read the clock, transmit datagrams, and arm or cancel timers.
pub struct Sim {
    scheduler: Scheduler,
    network: Network,
}

impl Sim {
    /// Create a simulation over a link with the given characteristics.
    pub fn new(link: LinkConfig, seed: u64) -> Self {
        Self {
            scheduler: Scheduler::new(),
            network: Network::new(link, seed),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Schedule `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: std::time::Duration, event: Event) -> TimerId {
        self.scheduler.schedule_in(delay, event)
    }

    /// Cancel a previously scheduled event. Canceling an already-fired or
    /// already-canceled timer is a no-op.
    pub fn cancel(&mut self, timer: TimerId) {
        self.scheduler.cancel(timer);
    }

    /// Hand a datagram to the link for delivery from `src` to `dst`.
    ///
    /// The link may drop it (loss) or delay it (propagation plus
    /// serialization behind earlier traffic); the core never learns which.
    pub fn send(&mut self, src: EndpointId, dst: EndpointId, payload: Bytes) {
        let now = self.scheduler.now();
        if let Some(deliver_at) = self.network.transmit(now, src, dst, payload.len()) {
            self.scheduler
                .schedule_at(deliver_at, Event::Datagram { src, dst, payload });
        }
    }

    /// Pop the next live event, advancing the clock to its timestamp.
    pub fn next(&mut self) -> Option<(SimTime, Event)> {
        self.scheduler.pop()
    }

    /// Link statistics access.
    pub fn network(&self) -> &Network {
        &self.network
    }
}
