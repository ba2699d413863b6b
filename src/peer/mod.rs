//! Peer roles over the transport.
//!
//! The [`Originator`] opens streams against a queue of pending
//! transactions and drains the queue whenever the congestion window
//! opens. The [`Responder`] keeps one channel per observed remote
//! endpoint, hands every inbound request line to an application handler,
//! and guarantees an ACK for every inbound datagram.

mod originator;
mod responder;

pub use originator::{Originator, Transaction, XferEvent};
pub use responder::{RequestHandler, Responder, ResponderConfig};
