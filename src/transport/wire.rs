//! Packet framing and serialization.
//!
//! Defines the wire format for transport packets.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Chan ID (1) │ Packet Seq (3) │ Ack Seq (3) │ Ack Count (1)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Stream ID (2) │ Byte Seq (4) │ Window (1) │ Flags (1)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (variable)                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Trailer (4)                                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integer fields are fixed-width big-endian; there is no length
//! prefix and no variable-length encoding, so the payload is everything
//! between the stream header and the trailer. Decoding validates only the
//! frame geometry and the trailer constant — semantic checks (does this
//! stream exist?) belong to the channel.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Channel header size in bytes
pub const CHANNEL_HEADER_SIZE: usize = 8;

/// Stream header size in bytes
pub const STREAM_HEADER_SIZE: usize = 8;

/// Integrity trailer size in bytes
pub const TRAILER_SIZE: usize = 4;

/// Smallest valid frame: both headers plus the trailer, zero payload
pub const MIN_FRAME_SIZE: usize = CHANNEL_HEADER_SIZE + STREAM_HEADER_SIZE + TRAILER_SIZE;

/// Placeholder lightweight authenticator. A real deployment would carry a
/// keyed checksum here; the simulator only checks the constant.
pub const TRAILER_VALUE: u32 = 0x1234_5678;

/// Mask for the 24-bit sequence fields.
const SEQ_MASK: u32 = 0x00ff_ffff;

/// Per-packet channel header: sequencing and acknowledgment state shared
/// by every stream on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHeader {
    /// Channel identifier
    pub channel_id: u8,
    /// Packet sequence number (24 bits on the wire)
    pub packet_seq: u32,
    /// Cumulative acknowledgment (24 bits on the wire)
    pub ack_seq: u32,
    /// Number of packets this acknowledgment covers
    pub ack_count: u8,
}

/// Per-packet stream header: which stream the payload belongs to and where
/// in its byte sequence it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream identifier, local to the channel
    pub stream_id: u16,
    /// Byte sequence number of the first payload byte
    pub byte_seq: u32,
    /// Advertised receive window (exponential encoding)
    pub window: u8,
    /// Stream flags
    pub flags: u8,
}

/// Stream header flags
pub mod flags {
    /// Payload should be pushed to the application immediately
    pub const PUSH: u8 = 0x01;
    /// Sender is done writing this stream
    pub const CLOSE: u8 = 0x02;
}

/// Serialize a packet into a flat frame.
pub fn encode(chan: &ChannelHeader, stream: &StreamHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE + payload.len());

    buf.put_u8(chan.channel_id);
    buf.put_uint((chan.packet_seq & SEQ_MASK) as u64, 3);
    buf.put_uint((chan.ack_seq & SEQ_MASK) as u64, 3);
    buf.put_u8(chan.ack_count);

    buf.put_u16(stream.stream_id);
    buf.put_u32(stream.byte_seq);
    buf.put_u8(stream.window);
    buf.put_u8(stream.flags);

    buf.put_slice(payload);
    buf.put_u32(TRAILER_VALUE);

    buf.freeze()
}

/// Deserialize a frame into headers and payload.
pub fn decode(mut data: Bytes) -> Result<(ChannelHeader, StreamHeader, Bytes)> {
    if data.len() < MIN_FRAME_SIZE {
        return Err(Error::ShortFrame {
            expected: MIN_FRAME_SIZE,
            actual: data.len(),
        });
    }

    let chan = ChannelHeader {
        channel_id: data.get_u8(),
        packet_seq: data.get_uint(3) as u32,
        ack_seq: data.get_uint(3) as u32,
        ack_count: data.get_u8(),
    };

    let stream = StreamHeader {
        stream_id: data.get_u16(),
        byte_seq: data.get_u32(),
        window: data.get_u8(),
        flags: data.get_u8(),
    };

    let payload = data.split_to(data.len() - TRAILER_SIZE);

    let trailer = data.get_u32();
    if trailer != TRAILER_VALUE {
        return Err(Error::BadTrailer { found: trailer });
    }

    Ok((chan, stream, payload))
}
