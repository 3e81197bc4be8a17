// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interleaved binary data framing over the RTSP TCP connection, per
//! [RFC 2326 §10.12](https://datatracker.ietf.org/doc/html/rfc2326#section-10.12):
//! a `$`, one channel byte, a two-byte big-endian length, then that many
//! bytes of RTP/RTCP payload, arbitrarily interleaved with plain RTSP
//! response text on the same connection.
//!
//! Mirrors the incremental, fragmentation-tolerant style of
//! [`message::ResponseParser`](super::message::ResponseParser): `Demuxer`
//! is fed arbitrarily-sized chunks of the connection and yields complete
//! frames only once enough bytes have arrived, leaving any trailing partial
//! frame buffered for the next call.

use bytes::{Buf, Bytes, BytesMut};

pub const MAGIC: u8 = b'$';
const HEADER_LEN: usize = 4;

/// One complete interleaved data frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel_id: u8,
    pub payload: Bytes,
}

/// Incremental parser for the `$`-framed interleaved data channel.
#[derive(Debug, Default)]
pub struct Demuxer {
    buf: BytesMut,
}

impl Demuxer {
    pub fn new() -> Self {
        Demuxer::default()
    }

    /// Appends newly-read bytes to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Gives the transport read loop direct access to the shared buffer so
    /// response bytes and interleaved-frame bytes can be drained from the
    /// same backing storage without an extra copy.
    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Returns `true` if enough bytes are buffered to start parsing an
    /// interleaved frame (i.e. the next byte is `$`), as opposed to plain
    /// RTSP response text that the caller should hand to the message parser
    /// instead.
    pub fn starts_frame(&self) -> bool {
        self.buf.first() == Some(&MAGIC)
    }

    /// Pulls the next complete frame out of the buffer, if any. Returns
    /// `Ok(None)` when more bytes are needed. Returns an error if the buffer
    /// doesn't actually start with a frame (callers must check
    /// [`Self::starts_frame`] first, or route through RTSP response parsing
    /// otherwise).
    pub fn next_frame(&mut self) -> Result<Option<Frame>, String> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf[0] != MAGIC {
            return Err(format!(
                "interleaved frame expected to start with '$' (0x24), got 0x{:02x}",
                self.buf[0]
            ));
        }
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let channel_id = self.buf[1];
        let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Frame { channel_id, payload }))
    }
}

/// Serializes `payload` as one interleaved frame on `channel_id`.
pub fn frame(channel_id: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&[MAGIC, channel_id]);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_one_frame() {
        let raw = frame(3, b"hello");
        let mut d = Demuxer::new();
        d.push(&raw);
        let f = d.next_frame().unwrap().unwrap();
        assert_eq!(f.channel_id, 3);
        assert_eq!(&f.payload[..], b"hello");
        assert!(d.next_frame().unwrap().is_none());
    }

    #[test]
    fn handles_arbitrary_fragmentation() {
        let raw = frame(1, b"0123456789");
        let mut d = Demuxer::new();
        let mut frames = Vec::new();
        for byte in raw.iter() {
            d.push(&[*byte]);
            while let Some(f) = d.next_frame().unwrap() {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"0123456789");
    }

    #[test]
    fn parses_back_to_back_frames() {
        let mut raw = frame(0, b"a").to_vec();
        raw.extend_from_slice(&frame(1, b"bb"));
        let mut d = Demuxer::new();
        d.push(&raw);
        let f1 = d.next_frame().unwrap().unwrap();
        let f2 = d.next_frame().unwrap().unwrap();
        assert_eq!(f1.channel_id, 0);
        assert_eq!(&f1.payload[..], b"a");
        assert_eq!(f2.channel_id, 1);
        assert_eq!(&f2.payload[..], b"bb");
    }

    #[test]
    fn empty_payload_is_valid() {
        let raw = frame(5, b"");
        let mut d = Demuxer::new();
        d.push(&raw);
        let f = d.next_frame().unwrap().unwrap();
        assert_eq!(f.channel_id, 5);
        assert!(f.payload.is_empty());
    }

    #[test]
    fn rejects_non_magic_start() {
        let mut d = Demuxer::new();
        d.push(b"RTSP/1.0 200 OK\r\n");
        assert!(d.next_frame().is_err());
    }

    #[test]
    fn starts_frame_reports_correctly() {
        let mut d = Demuxer::new();
        assert!(!d.starts_frame());
        d.push(b"$");
        assert!(d.starts_frame());
    }
}
