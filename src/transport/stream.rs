//! Per-transaction stream state.
//!
//! A stream is one logical request/response exchange multiplexed on a
//! channel. It is a passive pair of byte buffers: it never owns a timer
//! and never initiates retransmission — the channel administers it
//! entirely.

use bytes::{Bytes, BytesMut};

/// Stream identifier, local to the owning channel.
pub type StreamId = u16;

/// Application-supplied predicate deciding when an inbound buffer holds a
/// complete response (e.g. headers terminator present and the parsed
/// content-length satisfied).
pub type CompletionFn = Box<dyn Fn(&[u8]) -> bool>;

/// One logical byte exchange on a channel.
pub struct Stream {
    id: StreamId,
    next_send_byte: u32,
    next_expected_byte: u32,
    send_buffer: BytesMut,
    recv_buffer: BytesMut,
    complete: bool,
    is_done: CompletionFn,
}

impl Stream {
    /// Create a stream whose inbound completion is decided by `is_done`.
    pub fn new(id: StreamId, is_done: CompletionFn) -> Self {
        Self {
            id,
            next_send_byte: 0,
            next_expected_byte: 0,
            send_buffer: BytesMut::new(),
            recv_buffer: BytesMut::new(),
            complete: false,
            is_done,
        }
    }

    /// Stream identifier.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Append outbound bytes; they stay here until the channel frames them.
    pub fn write(&mut self, data: &[u8]) {
        self.send_buffer.extend_from_slice(data);
    }

    /// Take everything queued for sending.
    pub fn take_send_buffer(&mut self) -> Bytes {
        self.send_buffer.split().freeze()
    }

    /// Claim `len` bytes of the outbound sequence space, returning the
    /// byte sequence number the frame should carry.
    pub fn claim_send_bytes(&mut self, len: usize) -> u32 {
        let seq = self.next_send_byte;
        self.next_send_byte = self.next_send_byte.wrapping_add(len as u32);
        seq
    }

    /// Append inbound bytes and re-evaluate completion.
    ///
    /// Returns `true` only on the transition to complete; completion is
    /// monotonic and never reverts.
    pub fn on_receive(&mut self, data: &[u8]) -> bool {
        self.recv_buffer.extend_from_slice(data);
        self.next_expected_byte = self.next_expected_byte.wrapping_add(data.len() as u32);

        if !self.complete && (self.is_done)(&self.recv_buffer) {
            self.complete = true;
            return true;
        }
        false
    }

    /// Whether the completion predicate has matched. Idempotent.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Inbound bytes buffered so far.
    pub fn recv_buffer(&self) -> &[u8] {
        &self.recv_buffer
    }

    /// Next outbound byte sequence number.
    pub fn next_send_byte(&self) -> u32 {
        self.next_send_byte
    }

    /// Next expected inbound byte sequence number.
    pub fn next_expected_byte(&self) -> u32 {
        self.next_expected_byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never_done(id: StreamId) -> Stream {
        Stream::new(id, Box::new(|_| false))
    }

    #[test]
    fn test_write_then_take() {
        let mut stream = never_done(1);
        stream.write(b"GET /a");
        stream.write(b" HTTP/1.0\r\n\r\n");

        assert_eq!(stream.take_send_buffer().as_ref(), b"GET /a HTTP/1.0\r\n\r\n");
        assert!(stream.take_send_buffer().is_empty());
    }

    #[test]
    fn test_claim_advances_byte_seq() {
        let mut stream = never_done(1);
        assert_eq!(stream.claim_send_bytes(10), 0);
        assert_eq!(stream.claim_send_bytes(5), 10);
        assert_eq!(stream.next_send_byte(), 15);
    }

    #[test]
    fn test_completion_fires_once_and_sticks() {
        let mut stream = Stream::new(2, Box::new(|buf| buf.len() >= 4));

        assert!(!stream.on_receive(b"ab"));
        assert!(!stream.is_complete());

        assert!(stream.on_receive(b"cd"));
        assert!(stream.is_complete());

        // Already complete: no second transition.
        assert!(!stream.on_receive(b"ef"));
        assert!(stream.is_complete());
        assert_eq!(stream.recv_buffer(), b"abcdef");
    }

    #[test]
    fn test_receive_tracks_expected_byte() {
        let mut stream = never_done(3);
        stream.on_receive(b"hello");
        assert_eq!(stream.next_expected_byte(), 5);
    }
}
