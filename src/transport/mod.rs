//! Structured Stream Transport.
//!
//! A reliable, multiplexed stream protocol over an unreliable datagram
//! link:
//!
//! 1. **One channel per remote endpoint**: owns the packet sequence space,
//!    cumulative acknowledgments, RTT estimation and congestion control
//!    shared by every stream it carries
//!
//! 2. **Many streams per channel**: each stream is one logical
//!    request/response exchange with its own byte counters and buffers
//!
//! 3. **Timeout-driven reliability**: loss is detected only by
//!    retransmission timeout; retransmissions always go out under a fresh
//!    packet sequence number
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                 Application                    │
//! ├────────────────────────────────────────────────┤
//! │  Stream Layer (per-transaction byte buffers)   │
//! ├────────────────────────────────────────────────┤
//! │  Channel (sequencing, ACK, RTO, multiplexing)  │
//! ├────────────────────────────────────────────────┤
//! │  Congestion Control (slow start / avoidance)   │
//! ├────────────────────────────────────────────────┤
//! │  Wire Codec (fixed headers + trailer)          │
//! └────────────────────────────────────────────────┘
//! ```

mod channel;
mod congestion;
mod stream;
pub mod wire;

pub use channel::{Channel, Received, SendOutcome, StreamAcceptor, StreamEvent};
pub use congestion::{CongestionController, CongestionState, RttEstimator};
pub use stream::{CompletionFn, Stream, StreamId};

use std::time::Duration;

/// Initial congestion window, in packets
pub const INITIAL_CWND: u32 = 1;

/// Initial slow-start threshold, in packets
pub const INITIAL_SSTHRESH: u32 = 65_535;

/// Retransmission timeout before the first RTT sample
pub const INITIAL_RTO: Duration = Duration::from_secs(1);

/// Lower RTO clamp
pub const MIN_RTO: Duration = Duration::from_millis(200);

/// Upper RTO clamp and backoff cap
pub const MAX_RTO: Duration = Duration::from_secs(64);

/// Retransmission attempts before a packet is abandoned
pub const MAX_RETRANSMITS: u32 = 5;

/// Advertised window field value (exponential encoding, maximum)
pub const MAX_WINDOW: u8 = 31;

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Channel identifier carried in every header
    pub channel_id: u8,
    /// Initial congestion window (packets)
    pub initial_cwnd: u32,
    /// Initial slow-start threshold (packets)
    pub initial_ssthresh: u32,
    /// RTO before the first RTT sample
    pub initial_rto: Duration,
    /// Lower RTO clamp
    pub min_rto: Duration,
    /// Upper RTO clamp
    pub max_rto: Duration,
    /// Give-up threshold for retransmissions
    pub max_retransmits: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_id: 1,
            initial_cwnd: INITIAL_CWND,
            initial_ssthresh: INITIAL_SSTHRESH,
            initial_rto: INITIAL_RTO,
            min_rto: MIN_RTO,
            max_rto: MAX_RTO,
            max_retransmits: MAX_RETRANSMITS,
        }
    }
}
