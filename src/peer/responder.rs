//! Responding peer role.
//!
//! Keeps one channel per observed remote endpoint, keyed by structured
//! endpoint identity and evicted after an idle timeout so the table cannot
//! grow without bound. For every non-empty payload received the handler is
//! invoked with the parsed request line and its response goes out on the
//! same stream id the data arrived on. ACK generation is decoupled from
//! response generation: every inbound datagram provokes an ACK, whether or
//! not a response is ready.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;

use crate::sim::{EndpointId, Sim, SimTime};
use crate::transport::{Channel, ChannelConfig, SendOutcome, Stream, StreamEvent, StreamId};

/// Application handler producing a response body for a request line.
pub trait RequestHandler {
    /// Produce the response bytes for `request_line` (e.g.
    /// `GET /index.html?size=2048 HTTP/1.0`).
    fn respond(&mut self, request_line: &str) -> Bytes;
}

impl<F> RequestHandler for F
where
    F: FnMut(&str) -> Bytes,
{
    fn respond(&mut self, request_line: &str) -> Bytes {
        self(request_line)
    }
}

/// Responder configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Per-client channel configuration
    pub channel: ChannelConfig,
    /// Evict client state idle longer than this
    pub idle_timeout: Duration,
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Per-client state: the channel plus responses waiting for the window.
struct ClientState {
    channel: Channel,
    backlog: VecDeque<(StreamId, Bytes)>,
    last_activity: SimTime,
}

/// The responding role: per-endpoint channel table plus the application
/// handler.
pub struct Responder<H> {
    local: EndpointId,
    config: ResponderConfig,
    handler: H,
    /// Predicate for streams the peers open toward us
    request_done: fn(&[u8]) -> bool,
    clients: HashMap<EndpointId, ClientState>,
    last_sweep: SimTime,
}

impl<H: RequestHandler> Responder<H> {
    /// Create a responder at `local`. `request_done` decides when an
    /// accepted stream's inbound request buffer is complete.
    pub fn new(
        local: EndpointId,
        config: ResponderConfig,
        handler: H,
        request_done: fn(&[u8]) -> bool,
    ) -> Self {
        Self {
            local,
            config,
            handler,
            request_done,
            clients: HashMap::new(),
            last_sweep: SimTime::ZERO,
        }
    }

    /// Process an inbound datagram from `src`.
    pub fn on_datagram(&mut self, sim: &mut Sim, src: EndpointId, frame: Bytes) {
        self.sweep_idle(sim.now());

        let local = self.local;
        let channel_config = self.config.channel.clone();
        let request_done = self.request_done;
        let state = self.clients.entry(src).or_insert_with(|| {
            tracing::debug!(client = %src, "new client channel");
            ClientState {
                channel: Channel::new(local, src, channel_config).with_acceptor(Box::new(
                    move |id| Stream::new(id, Box::new(request_done)),
                )),
                backlog: VecDeque::new(),
                last_activity: SimTime::ZERO,
            }
        });
        state.last_activity = sim.now();

        let Some(received) = state.channel.on_datagram(sim, frame) else {
            return;
        };

        if received.has_payload {
            for event in &received.events {
                let stream = match event {
                    StreamEvent::Data { stream } | StreamEvent::Completed { stream } => *stream,
                    StreamEvent::Abandoned { .. } => continue,
                };
                let Some(line) = state
                    .channel
                    .stream(stream)
                    .and_then(|s| request_line(s.recv_buffer()))
                else {
                    tracing::debug!(client = %src, stream, "no parsable request line yet");
                    continue;
                };

                let body = self.handler.respond(&line);
                tracing::trace!(client = %src, stream, len = body.len(), "response ready");
                match state.channel.try_send(sim, stream, body.clone()) {
                    SendOutcome::Sent(_) => {}
                    SendOutcome::WindowFull => state.backlog.push_back((stream, body)),
                    SendOutcome::UnknownStream => {
                        tracing::debug!(client = %src, stream, "response for vanished stream")
                    }
                }
            }
        }

        // ACK unconditionally, decoupled from any response above.
        state.channel.send_ack(sim);

        if received.window_opened {
            Self::drain_backlog(sim, state);
        }
    }

    /// Process a retransmission timeout for a packet sent to `peer`.
    pub fn on_rto(&mut self, sim: &mut Sim, peer: EndpointId, seq: u32) {
        let Some(state) = self.clients.get_mut(&peer) else {
            return;
        };
        if let Some(StreamEvent::Abandoned { stream, .. }) = state.channel.on_timeout(sim, seq) {
            tracing::warn!(client = %peer, stream, "response abandoned");
            state.channel.remove_stream(stream);
        }
        Self::drain_backlog(sim, state);
    }

    fn drain_backlog(sim: &mut Sim, state: &mut ClientState) {
        while state.channel.can_send() {
            let Some((stream, body)) = state.backlog.pop_front() else {
                break;
            };
            match state.channel.try_send(sim, stream, body) {
                SendOutcome::Sent(_) => {}
                SendOutcome::WindowFull | SendOutcome::UnknownStream => break,
            }
        }
    }

    fn sweep_idle(&mut self, now: SimTime) {
        if now - self.last_sweep < self.config.sweep_interval {
            return;
        }
        self.last_sweep = now;

        let idle_timeout = self.config.idle_timeout;
        let before = self.clients.len();
        self.clients
            .retain(|_, state| now - state.last_activity < idle_timeout);
        let evicted = before - self.clients.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.clients.len(), "idle clients evicted");
        }
    }

    /// Number of tracked client channels.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Extract the first CRLF-terminated line of a request buffer.
fn request_line(buf: &[u8]) -> Option<String> {
    let end = buf.windows(2).position(|w| w == b"\r\n")?;
    std::str::from_utf8(&buf[..end]).ok().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Event, LinkConfig};
    use crate::transport::wire::{self, ChannelHeader, StreamHeader};
    use crate::transport::MAX_WINDOW;

    const SERVER: EndpointId = EndpointId(10);
    const CLIENT: EndpointId = EndpointId(1);

    fn echo_handler(line: &str) -> Bytes {
        Bytes::from(format!("echo: {line}"))
    }

    fn setup() -> (Sim, Responder<fn(&str) -> Bytes>) {
        let sim = Sim::new(LinkConfig::default(), 1);
        let responder = Responder::new(
            SERVER,
            ResponderConfig::default(),
            echo_handler as fn(&str) -> Bytes,
            |buf| buf.windows(4).any(|w| w == b"\r\n\r\n"),
        );
        (sim, responder)
    }

    fn request_frame(peer_seq: u32, stream: StreamId, payload: &[u8]) -> Bytes {
        let chan = ChannelHeader {
            channel_id: 1,
            packet_seq: peer_seq,
            ack_seq: 0,
            ack_count: 1,
        };
        let header = StreamHeader {
            stream_id: stream,
            byte_seq: 0,
            window: MAX_WINDOW,
            flags: 0,
        };
        wire::encode(&chan, &header, payload)
    }

    fn ack_only_frame(peer_seq: u32, ack_seq: u32) -> Bytes {
        let chan = ChannelHeader {
            channel_id: 1,
            packet_seq: peer_seq,
            ack_seq,
            ack_count: 1,
        };
        let header = StreamHeader {
            stream_id: 0,
            byte_seq: 0,
            window: MAX_WINDOW,
            flags: 0,
        };
        wire::encode(&chan, &header, b"")
    }

    /// Decode every datagram the responder pushed toward `dst`.
    fn outbound(sim: &mut Sim, dst: EndpointId) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some((_, event)) = sim.next() {
            if let Event::Datagram {
                dst: d, payload, ..
            } = event
            {
                if d == dst {
                    frames.push(payload);
                }
            }
        }
        frames
    }

    #[test]
    fn test_request_gets_response_and_ack() {
        let (mut sim, mut responder) = setup();
        responder.on_datagram(
            &mut sim,
            CLIENT,
            request_frame(1, 1, b"GET /a?size=10 HTTP/1.0\r\n\r\n"),
        );
        assert_eq!(responder.client_count(), 1);

        let frames = outbound(&mut sim, CLIENT);
        let mut bodies = Vec::new();
        for frame in frames {
            let (chan, header, payload) = wire::decode(frame).unwrap();
            assert_eq!(chan.ack_seq, 1);
            if !payload.is_empty() {
                assert_eq!(header.stream_id, 1);
                bodies.push(payload);
            }
        }
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].as_ref(), b"echo: GET /a?size=10 HTTP/1.0");
    }

    #[test]
    fn test_ack_even_without_parsable_request() {
        let (mut sim, mut responder) = setup();
        // Payload with no CRLF yet: handler not invoked, ACK still out.
        responder.on_datagram(&mut sim, CLIENT, request_frame(1, 1, b"GET /incompl"));

        let frames = outbound(&mut sim, CLIENT);
        assert_eq!(frames.len(), 1);
        let (chan, _, payload) = wire::decode(frames[0].clone()).unwrap();
        assert!(payload.is_empty());
        assert_eq!(chan.ack_seq, 1);
    }

    #[test]
    fn test_pure_ack_datagram_only_acked() {
        let (mut sim, mut responder) = setup();
        responder.on_datagram(&mut sim, CLIENT, request_frame(1, 0, b""));

        // No handler output, but the inbound datagram is still acked.
        let frames = outbound(&mut sim, CLIENT);
        assert_eq!(frames.len(), 1);
        let (_, _, payload) = wire::decode(frames[0].clone()).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_channel_per_endpoint() {
        let (mut sim, mut responder) = setup();
        responder.on_datagram(&mut sim, EndpointId(1), request_frame(1, 1, b"GET /x\r\n\r\n"));
        responder.on_datagram(&mut sim, EndpointId(2), request_frame(1, 1, b"GET /y\r\n\r\n"));
        assert_eq!(responder.client_count(), 2);
    }

    #[test]
    fn test_window_full_response_queued_until_ack() {
        let (mut sim, mut responder) = setup();
        // Two requests: cwnd=1, so the second response must queue.
        responder.on_datagram(&mut sim, CLIENT, request_frame(1, 1, b"GET /a\r\n\r\n"));
        responder.on_datagram(&mut sim, CLIENT, request_frame(2, 2, b"GET /b\r\n\r\n"));

        let with_payload = |frames: &[Bytes]| {
            frames
                .iter()
                .filter(|f| {
                    let (_, _, p) = wire::decode((*f).clone()).unwrap();
                    !p.is_empty()
                })
                .count()
        };

        let frames = outbound(&mut sim, CLIENT);
        assert_eq!(with_payload(&frames), 1);

        // Client acks the first response (server seq 1): backlog drains.
        responder.on_datagram(&mut sim, CLIENT, ack_only_frame(3, 1));
        let frames = outbound(&mut sim, CLIENT);
        assert_eq!(with_payload(&frames), 1);
    }

    #[test]
    fn test_idle_clients_evicted() {
        let (mut sim, mut responder) = setup();
        responder.on_datagram(&mut sim, EndpointId(1), request_frame(1, 1, b"GET /a\r\n\r\n"));
        let _ = outbound(&mut sim, EndpointId(1));

        // Jump far past the idle timeout, then touch from another client.
        sim.schedule(Duration::from_secs(120), Event::NextPage);
        while sim.next().is_some() {}
        responder.on_datagram(&mut sim, EndpointId(2), request_frame(1, 1, b"GET /b\r\n\r\n"));

        assert_eq!(responder.client_count(), 1);
    }
}
