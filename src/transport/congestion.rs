//! Congestion control and round-trip estimation.
//!
//! TCP-style window management shared by every stream on a channel.
//!
//! ## State Machine
//!
//! ```text
//! ┌────────────┐    cwnd >= ssthresh    ┌──────────────────────┐
//! │ SLOW START │ ─────────────────────▶ │ CONGESTION AVOIDANCE │
//! └────────────┘                        └──────────────────────┘
//!       ▲                                          │
//!       └────────── retransmission timeout ────────┘
//! ```
//!
//! Slow start grows the window by the newly acknowledged packet count
//! (exponential over round trips); congestion avoidance grows it by
//! roughly one packet per window. The only loss signal is a
//! retransmission timeout, which halves `ssthresh`, collapses the window
//! to one packet, and re-enters slow start. There is no fast-retransmit
//! or duplicate-ACK path.

use std::time::Duration;

/// Congestion control regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    /// Exponential window growth until `ssthresh`
    SlowStart,
    /// Additive growth past `ssthresh`
    CongestionAvoidance,
}

/// Window state machine for one channel.
#[derive(Debug, Clone)]
pub struct CongestionController {
    cwnd: u32,
    ssthresh: u32,
    state: CongestionState,
}

impl CongestionController {
    /// Create a controller with the given initial window and threshold.
    pub fn new(initial_cwnd: u32, initial_ssthresh: u32) -> Self {
        Self {
            cwnd: initial_cwnd,
            ssthresh: initial_ssthresh,
            state: CongestionState::SlowStart,
        }
    }

    /// True while another packet fits in the window.
    pub fn has_room(&self, in_flight: u32) -> bool {
        in_flight < self.cwnd
    }

    /// Apply one ACK batch covering `newly_acked` sequence numbers.
    pub fn on_ack(&mut self, newly_acked: u32) {
        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += newly_acked;
                if self.cwnd >= self.ssthresh {
                    self.state = CongestionState::CongestionAvoidance;
                    tracing::debug!(cwnd = self.cwnd, "leaving slow start");
                }
            }
            CongestionState::CongestionAvoidance => {
                self.cwnd += (newly_acked / self.cwnd).max(1);
            }
        }
    }

    /// Apply a loss signal: halve the threshold, collapse the window,
    /// re-enter slow start.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(2);
        self.cwnd = 1;
        self.state = CongestionState::SlowStart;
        tracing::debug!(ssthresh = self.ssthresh, "timeout, window collapsed");
    }

    /// Current congestion window in packets.
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// Current slow-start threshold in packets.
    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    /// Current regime.
    pub fn state(&self) -> CongestionState {
        self.state
    }
}

/// Exponentially smoothed RTT estimate and the retransmission timeout
/// derived from it.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
}

impl RttEstimator {
    /// Create an estimator with no samples yet.
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration) -> Self {
        Self {
            srtt: None,
            rto: initial_rto,
            min_rto,
            max_rto,
        }
    }

    /// Fold in one RTT sample. The first sample initializes the estimate
    /// directly; later samples are weighted 1/8 against the running
    /// estimate, and the RTO becomes `4 * srtt` clamped to the configured
    /// bounds.
    pub fn on_sample(&mut self, sample: Duration) {
        let srtt = match self.srtt {
            None => sample,
            Some(prev) => (prev * 7 + sample) / 8,
        };
        self.srtt = Some(srtt);
        self.rto = (srtt * 4).clamp(self.min_rto, self.max_rto);
    }

    /// Double the RTO after a timeout, capped at the maximum.
    pub fn backoff(&mut self) {
        self.rto = (self.rto * 2).min(self.max_rto);
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Smoothed RTT, if any sample has arrived.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }
}
