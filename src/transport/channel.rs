//! The channel state machine.
//!
//! One channel per remote endpoint. The channel owns the packet sequence
//! space, the cumulative-acknowledgment cursor, the congestion and RTT
//! state, the in-flight packet table with its retransmission timers, and
//! the stream multiplexing table.
//!
//! Two invariants drive the implementation:
//!
//! - Packet sequence numbers are never reused. Every transmission —
//!   retransmissions and ACK-only packets included — consumes a fresh
//!   value, so an ACK can never be attributed to a transmission that was
//!   already given up on.
//! - A retransmission timer is trusted only after re-validating its
//!   target: the handler looks the sequence number up in the in-flight
//!   table at fire time. A timer racing an ACK finds nothing and does
//!   nothing.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::sim::{EndpointId, Event, Sim, SimTime, TimerId};
use crate::transport::wire::{self, ChannelHeader, StreamHeader};
use crate::transport::{
    ChannelConfig, CompletionFn, CongestionController, CongestionState, RttEstimator, Stream,
    StreamId, MAX_WINDOW,
};

/// A transmitted packet awaiting acknowledgment.
struct PendingPacket {
    payload: Bytes,
    header: StreamHeader,
    sent_at: SimTime,
    retransmits: u32,
    timer: TimerId,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// Transmitted under this packet sequence number
    Sent(u32),
    /// Congestion window full; re-queue and retry when it opens
    WindowFull,
    /// No such stream on this channel
    UnknownStream,
}

/// Stream-level notification produced while processing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Payload was appended to the stream's inbound buffer
    Data {
        /// The receiving stream
        stream: StreamId,
    },
    /// The stream's completion predicate matched
    Completed {
        /// The completed stream
        stream: StreamId,
    },
    /// Retry budget exhausted; the packet was dropped permanently and the
    /// stream will not make further progress from this transmission
    Abandoned {
        /// The stream whose packet was abandoned
        stream: StreamId,
        /// The sequence number given up on
        seq: u32,
    },
}

/// What an inbound datagram did to the channel.
#[derive(Debug)]
pub struct Received {
    /// Packet sequence number carried by the datagram
    pub packet_seq: u32,
    /// Stream the payload was addressed to
    pub stream: StreamId,
    /// Whether the datagram carried payload bytes
    pub has_payload: bool,
    /// Whether ACK processing opened the congestion window
    pub window_opened: bool,
    /// Stream-level notifications
    pub events: Vec<StreamEvent>,
}

/// Factory invoked when payload arrives for a stream id the channel does
/// not know; returning a stream accepts it (the responder case).
pub type StreamAcceptor = Box<dyn Fn(StreamId) -> Stream>;

/// Reliability, congestion control and stream multiplexing toward one
/// remote endpoint.
pub struct Channel {
    local: EndpointId,
    remote: EndpointId,
    config: ChannelConfig,

    next_packet_seq: u32,
    last_acked_seq: u32,
    highest_received_seq: u32,

    cc: CongestionController,
    rtt: RttEstimator,

    in_flight: BTreeMap<u32, PendingPacket>,
    streams: HashMap<StreamId, Stream>,
    next_stream_id: StreamId,
    acceptor: Option<StreamAcceptor>,
}

impl Channel {
    /// Create a channel from `local` toward `remote`.
    pub fn new(local: EndpointId, remote: EndpointId, config: ChannelConfig) -> Self {
        let cc = CongestionController::new(config.initial_cwnd, config.initial_ssthresh);
        let rtt = RttEstimator::new(config.initial_rto, config.min_rto, config.max_rto);
        Self {
            local,
            remote,
            config,
            next_packet_seq: 1,
            last_acked_seq: 0,
            highest_received_seq: 0,
            cc,
            rtt,
            in_flight: BTreeMap::new(),
            streams: HashMap::new(),
            next_stream_id: 1,
            acceptor: None,
        }
    }

    /// Accept streams the peer opens (responder side).
    pub fn with_acceptor(mut self, acceptor: StreamAcceptor) -> Self {
        self.acceptor = Some(acceptor);
        self
    }

    /// Open a locally initiated stream. Ids are assigned monotonically and
    /// never reused while the channel is alive.
    pub fn open_stream(&mut self, is_done: CompletionFn) -> StreamId {
        let id = self.next_stream_id;
        self.next_stream_id = self.next_stream_id.wrapping_add(1);
        self.streams.insert(id, Stream::new(id, is_done));
        id
    }

    /// Look up a stream.
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Remove a stream, typically once complete.
    pub fn remove_stream(&mut self, id: StreamId) {
        self.streams.remove(&id);
    }

    /// Discard every stream at once (page timeout). In-flight packets stay
    /// until acknowledged or abandoned; late payload for a discarded
    /// stream is dropped as an unknown stream reference.
    pub fn discard_streams(&mut self) {
        let count = self.streams.len();
        self.streams.clear();
        if count > 0 {
            tracing::debug!(remote = %self.remote, count, "discarded streams");
        }
    }

    /// True while the congestion window admits another packet.
    pub fn can_send(&self) -> bool {
        self.cc.has_room(self.in_flight.len() as u32)
    }

    /// Admit one payload for `stream_id`.
    ///
    /// A `WindowFull` outcome is backpressure, not an error: the caller
    /// re-queues and retries when an ACK opens the window.
    pub fn try_send(&mut self, sim: &mut Sim, stream_id: StreamId, payload: Bytes) -> SendOutcome {
        if !self.can_send() {
            return SendOutcome::WindowFull;
        }

        let header = match self.streams.get_mut(&stream_id) {
            Some(stream) => StreamHeader {
                stream_id,
                byte_seq: stream.claim_send_bytes(payload.len()),
                window: MAX_WINDOW,
                flags: 0,
            },
            None => {
                tracing::debug!(remote = %self.remote, stream_id, "send for unknown stream");
                return SendOutcome::UnknownStream;
            }
        };

        let seq = self.transmit(sim, header, payload, 0);
        SendOutcome::Sent(seq)
    }

    /// Emit an ACK-only packet. It consumes a fresh sequence number but is
    /// not tracked for retransmission and bypasses window admission.
    pub fn send_ack(&mut self, sim: &mut Sim) {
        let seq = self.alloc_seq();
        let chan = ChannelHeader {
            channel_id: self.config.channel_id,
            packet_seq: seq,
            ack_seq: self.highest_received_seq,
            ack_count: 1,
        };
        let header = StreamHeader {
            stream_id: 0,
            byte_seq: 0,
            window: MAX_WINDOW,
            flags: 0,
        };
        let frame = wire::encode(&chan, &header, b"");
        sim.send(self.local, self.remote, frame);
        tracing::trace!(remote = %self.remote, seq, ack = chan.ack_seq, "ack sent");
    }

    /// Process an inbound datagram. Malformed frames are dropped silently
    /// (debug log) with no state change; `None` reports exactly that.
    pub fn on_datagram(&mut self, sim: &mut Sim, frame: Bytes) -> Option<Received> {
        let (chan, stream_hdr, payload) = match wire::decode(frame) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::debug!(remote = %self.remote, %err, "dropped malformed datagram");
                return None;
            }
        };

        if chan.packet_seq > self.highest_received_seq {
            self.highest_received_seq = chan.packet_seq;
        }

        let window_opened = self.on_ack(sim, chan.ack_seq);

        let mut events = Vec::new();
        let has_payload = !payload.is_empty();
        if has_payload {
            self.route_payload(stream_hdr.stream_id, &payload, &mut events);
        }

        Some(Received {
            packet_seq: chan.packet_seq,
            stream: stream_hdr.stream_id,
            has_payload,
            window_opened,
            events,
        })
    }

    fn route_payload(&mut self, stream_id: StreamId, payload: &[u8], events: &mut Vec<StreamEvent>) {
        if !self.streams.contains_key(&stream_id) {
            match &self.acceptor {
                Some(accept) => {
                    let stream = accept(stream_id);
                    self.streams.insert(stream_id, stream);
                }
                None => {
                    tracing::debug!(remote = %self.remote, stream_id, "payload for unknown stream");
                    return;
                }
            }
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };

        if stream.on_receive(payload) {
            events.push(StreamEvent::Completed { stream: stream_id });
        } else {
            events.push(StreamEvent::Data { stream: stream_id });
        }
    }

    /// Apply a cumulative acknowledgment. Returns whether the window has
    /// room after the update (the caller's cue to drain queued sends).
    fn on_ack(&mut self, sim: &mut Sim, ack_seq: u32) -> bool {
        if ack_seq <= self.last_acked_seq {
            return false;
        }
        let newly_acked = ack_seq - self.last_acked_seq;

        // Everything at or below the cursor was already removed, so the
        // open range (last_acked, ack] is just ..=ack here.
        let acked: Vec<u32> = self
            .in_flight
            .range(..=ack_seq)
            .map(|(&seq, _)| seq)
            .collect();

        let now = sim.now();
        for seq in acked {
            if let Some(pending) = self.in_flight.remove(&seq) {
                sim.cancel(pending.timer);
                self.rtt.on_sample(now - pending.sent_at);
            }
        }

        self.last_acked_seq = ack_seq;
        self.cc.on_ack(newly_acked);

        tracing::trace!(
            remote = %self.remote,
            ack = ack_seq,
            cwnd = self.cc.cwnd(),
            ssthresh = self.cc.ssthresh(),
            rto_us = self.rtt.rto().as_micros() as u64,
            "ack applied"
        );

        self.can_send()
    }

    /// Handle a retransmission timer firing for `seq`.
    ///
    /// Presence in the in-flight table is the only source of truth: if an
    /// ACK already removed the entry this is a guaranteed no-op, whatever
    /// order the two events were scheduled in.
    pub fn on_timeout(&mut self, sim: &mut Sim, seq: u32) -> Option<StreamEvent> {
        let mut pending = self.in_flight.remove(&seq)?;
        pending.retransmits += 1;

        if pending.retransmits >= self.config.max_retransmits {
            tracing::warn!(
                remote = %self.remote,
                seq,
                stream = pending.header.stream_id,
                attempts = pending.retransmits,
                "retry budget exhausted, abandoning packet"
            );
            return Some(StreamEvent::Abandoned {
                stream: pending.header.stream_id,
                seq,
            });
        }

        // Loss signal: collapse the window, back the RTO off, then resend
        // the same payload under a brand-new sequence number.
        self.cc.on_timeout();
        self.rtt.backoff();

        let new_seq = self.transmit(sim, pending.header, pending.payload, pending.retransmits);
        tracing::debug!(
            remote = %self.remote,
            old_seq = seq,
            new_seq,
            attempt = pending.retransmits,
            rto_us = self.rtt.rto().as_micros() as u64,
            "retransmitted"
        );
        None
    }

    fn alloc_seq(&mut self) -> u32 {
        let seq = self.next_packet_seq;
        self.next_packet_seq += 1;
        seq
    }

    fn transmit(
        &mut self,
        sim: &mut Sim,
        header: StreamHeader,
        payload: Bytes,
        retransmits: u32,
    ) -> u32 {
        let seq = self.alloc_seq();
        let chan = ChannelHeader {
            channel_id: self.config.channel_id,
            packet_seq: seq,
            ack_seq: self.highest_received_seq,
            ack_count: 1,
        };

        let frame = wire::encode(&chan, &header, &payload);
        sim.send(self.local, self.remote, frame);

        let timer = sim.schedule(
            self.rtt.rto(),
            Event::Rto {
                owner: self.local,
                peer: self.remote,
                seq,
            },
        );
        self.in_flight.insert(
            seq,
            PendingPacket {
                payload,
                header,
                sent_at: sim.now(),
                retransmits,
                timer,
            },
        );
        seq
    }

    /// Packets transmitted but not yet acknowledged or abandoned.
    pub fn packets_in_flight(&self) -> u32 {
        self.in_flight.len() as u32
    }

    /// Current congestion window in packets.
    pub fn cwnd(&self) -> u32 {
        self.cc.cwnd()
    }

    /// Current slow-start threshold in packets.
    pub fn ssthresh(&self) -> u32 {
        self.cc.ssthresh()
    }

    /// Current congestion regime.
    pub fn congestion_state(&self) -> CongestionState {
        self.cc.state()
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> std::time::Duration {
        self.rtt.rto()
    }

    /// Highest cumulatively acknowledged sequence number.
    pub fn last_acked_seq(&self) -> u32 {
        self.last_acked_seq
    }

    /// Highest packet sequence number seen from the peer.
    pub fn highest_received_seq(&self) -> u32 {
        self.highest_received_seq
    }

    /// Number of live streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Remote endpoint this channel points at.
    pub fn remote(&self) -> EndpointId {
        self.remote
    }
}
