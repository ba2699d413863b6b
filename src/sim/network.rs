//! Lossy datagram link model.
//!
//! Models a point-to-point link the way the transport sees it: a datagram
//! handed to the link either disappears or arrives at the far endpoint
//! after serialization plus propagation delay. Serialization is FIFO per
//! direction, so a burst of packets queues behind itself; the transport is
//! never told about drops.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::scheduler::SimTime;

/// Structured identity of a simulated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u32);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Link characteristics.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Link rate in bits per second
    pub bandwidth_bps: u64,
    /// One-way propagation delay
    pub delay: Duration,
    /// Independent per-datagram loss probability (0.0 - 1.0)
    pub loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bandwidth_bps: 1_500_000, // 1.5 Mbps
            delay: Duration::from_millis(25),
            loss_rate: 0.0,
        }
    }
}

/// The unreliable datagram substrate between endpoints.
pub struct Network {
    config: LinkConfig,
    rng: StdRng,
    /// Per-direction serialization horizon
    link_busy: HashMap<(EndpointId, EndpointId), SimTime>,
    sent: u64,
    dropped: u64,
}

impl Network {
    /// Create a link with deterministic loss decisions for `seed`.
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            link_busy: HashMap::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Accept a datagram of `len` bytes for transmission at `now`.
    ///
    /// Returns the delivery instant, or `None` if the link dropped it.
    pub fn transmit(
        &mut self,
        now: SimTime,
        src: EndpointId,
        dst: EndpointId,
        len: usize,
    ) -> Option<SimTime> {
        self.sent += 1;

        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            self.dropped += 1;
            tracing::trace!(%src, %dst, len, "datagram lost");
            return None;
        }

        let tx = self.serialization_time(len);
        let busy = self.link_busy.entry((src, dst)).or_insert(SimTime::ZERO);
        let start = now.max(*busy);
        let done = start + tx;
        *busy = done;

        let deliver_at = done + self.config.delay;
        tracing::trace!(%src, %dst, len, at = %deliver_at, "datagram in transit");
        Some(deliver_at)
    }

    fn serialization_time(&self, len: usize) -> Duration {
        let micros = (len as u64 * 8).saturating_mul(1_000_000) / self.config.bandwidth_bps.max(1);
        Duration::from_micros(micros)
    }

    /// Total datagrams handed to the link.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Datagrams the link dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(loss: f64) -> LinkConfig {
        LinkConfig {
            bandwidth_bps: 1_000_000,
            delay: Duration::from_millis(10),
            loss_rate: loss,
        }
    }

    #[test]
    fn test_delivery_time_includes_serialization_and_delay() {
        let mut net = Network::new(cfg(0.0), 1);
        // 125 bytes at 1 Mbps = 1 ms serialization, + 10 ms propagation.
        let at = net
            .transmit(SimTime::ZERO, EndpointId(1), EndpointId(2), 125)
            .unwrap();
        assert_eq!(at.as_micros(), 11_000);
    }

    #[test]
    fn test_back_to_back_datagrams_queue() {
        let mut net = Network::new(cfg(0.0), 1);
        let a = EndpointId(1);
        let b = EndpointId(2);

        let first = net.transmit(SimTime::ZERO, a, b, 125).unwrap();
        let second = net.transmit(SimTime::ZERO, a, b, 125).unwrap();
        // Second serializes behind the first.
        assert_eq!(second.as_micros() - first.as_micros(), 1_000);

        // The reverse direction is independent.
        let reverse = net.transmit(SimTime::ZERO, b, a, 125).unwrap();
        assert_eq!(reverse.as_micros(), first.as_micros());
    }

    #[test]
    fn test_loss_is_deterministic_per_seed() {
        let outcomes = |seed: u64| -> Vec<bool> {
            let mut net = Network::new(cfg(0.5), seed);
            (0..32)
                .map(|_| {
                    net.transmit(SimTime::ZERO, EndpointId(1), EndpointId(2), 100)
                        .is_some()
                })
                .collect()
        };

        assert_eq!(outcomes(42), outcomes(42));
        assert!(outcomes(42).iter().any(|ok| !ok));
        assert!(outcomes(42).iter().any(|ok| *ok));
    }

    #[test]
    fn test_counters() {
        let mut net = Network::new(cfg(1.0), 3);
        assert!(net
            .transmit(SimTime::ZERO, EndpointId(1), EndpointId(2), 10)
            .is_none());
        assert_eq!(net.sent(), 1);
        assert_eq!(net.dropped(), 1);
    }
}
