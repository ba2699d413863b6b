//! # SST Simulator
//!
//! A discrete-event simulation harness comparing HTTP transfer strategies —
//! serial, parallel, persistent, pipelined connections, and a structured
//! stream transport (SST) that multiplexes every transaction over one
//! congestion-controlled channel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Harness (pages, HTTP model, pool presets, statistics)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Peer Roles (originator queue / responder table)        │
//! ├─────────────────────────────────────────────────────────┤
//! │  Transport (channel, streams, congestion, wire codec)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Simulation (virtual clock, event queue, lossy link)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **Determinism**: identical seeds yield identical packet traces
//! 2. **One channel, many streams**: shared sequencing, acknowledgment and
//!    congestion state across all transactions to one endpoint
//! 3. **Loss tolerance**: timeout-driven retransmission under fresh
//!    sequence numbers, with exponential RTO backoff
//! 4. **Comparability**: every strategy runs over the same simulated link

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod harness;
pub mod peer;
pub mod sim;
pub mod transport;
pub mod workload;

pub use error::{Error, Result};
