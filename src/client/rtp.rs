// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTP reception: parsing inbound packets (from either transport) and
//! maintaining the per-SSRC sequence/jitter bookkeeping that the paired
//! RTCP exchange reports back upstream.

use bytes::Bytes;

use crate::proto::rtcp::ReceiverStats;
use crate::proto::rtp;
use crate::PacketContext;

/// One received RTP packet, decoded down to the fields an application (or
/// the out-of-scope depacketization layer it owns) needs.
#[derive(Clone)]
pub struct Packet {
    pub ctx: PacketContext,
    pub stream_id: usize,
    pub timestamp: crate::Timestamp,
    pub ssrc: u32,
    pub sequence_number: u16,
    pub marker: bool,
    pub payload_type: u8,
    pub payload: Bytes,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_id", &self.stream_id)
            .field("ssrc", &self.ssrc)
            .field("sequence_number", &self.sequence_number)
            .field("marker", &self.marker)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Tracks reception state for one track's RTP stream: sequence/jitter/loss
/// bookkeeping (consumed by the paired RTCP exchange's outbound reports)
/// and malformed-packet counting.
pub struct RtpReceiver {
    stream_id: usize,
    stats: Option<ReceiverStats>,
    clock_rate: std::num::NonZeroU32,
    start_timestamp: Option<u32>,
    dropped_malformed: u64,
}

impl RtpReceiver {
    pub fn new(stream_id: usize, clock_rate: std::num::NonZeroU32) -> Self {
        RtpReceiver {
            stream_id,
            stats: None,
            clock_rate,
            start_timestamp: None,
            dropped_malformed: 0,
        }
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed
    }

    pub fn stats(&self) -> Option<&ReceiverStats> {
        self.stats.as_ref()
    }

    pub fn stats_mut(&mut self) -> Option<&mut ReceiverStats> {
        self.stats.as_mut()
    }

    /// Seeds the timeline start from a `PLAY` response's `RTP-Info`, if the
    /// server sent one for this track.
    pub fn seed_start_timestamp(&mut self, rtptime: u32) {
        self.start_timestamp = Some(rtptime);
    }

    /// Parses one raw RTP packet (from a UDP datagram or an interleaved
    /// frame) and updates sequence/jitter bookkeeping. Returns `None`
    /// (after counting it) rather than propagating a parse error: per the
    /// error taxonomy, malformed media is dropped and counted, never fatal.
    ///
    /// `arrival` is the local wall-clock arrival time, already expressed in
    /// the track's clock-rate units, for jitter computation (RFC 3550
    /// Appendix A.8).
    pub fn receive(&mut self, ctx: PacketContext, data: Bytes, arrival: u32) -> Option<Packet> {
        let parsed = match rtp::parse(data) {
            Ok(p) => p,
            Err(description) => {
                log::debug!("stream {}: dropping malformed RTP packet: {}", self.stream_id, description);
                self.dropped_malformed += 1;
                return None;
            }
        };
        let hdr = &parsed.header;

        match &mut self.stats {
            Some(stats) if stats.ssrc == hdr.ssrc => {
                stats.record_sequence(hdr.sequence_number);
            }
            _ => {
                // First packet, or a new SSRC (eg a source switch):
                // tracking restarts from scratch rather than mixing stats
                // across sources.
                self.stats = Some(ReceiverStats::new(hdr.ssrc, hdr.sequence_number));
            }
        }
        let stats = self.stats.as_mut().expect("just populated");
        stats.record_jitter(hdr.timestamp, arrival);

        let start = *self.start_timestamp.get_or_insert(hdr.timestamp);
        let timestamp = match crate::Timestamp::new(i64::from(hdr.timestamp), self.clock_rate, start) {
            Some(ts) => ts,
            None => {
                self.dropped_malformed += 1;
                return None;
            }
        };

        Some(Packet {
            ctx,
            stream_id: self.stream_id,
            timestamp,
            ssrc: hdr.ssrc,
            sequence_number: hdr.sequence_number,
            marker: hdr.marker,
            payload_type: hdr.payload_type,
            payload: parsed.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u16, ts: u32, ssrc: u32) -> Bytes {
        let mut v = vec![0x80, 96];
        v.extend_from_slice(&seq.to_be_bytes());
        v.extend_from_slice(&ts.to_be_bytes());
        v.extend_from_slice(&ssrc.to_be_bytes());
        v.extend_from_slice(b"x");
        Bytes::from(v)
    }

    #[test]
    fn decodes_and_tracks_sequence() {
        let mut recv = RtpReceiver::new(0, std::num::NonZeroU32::new(90_000).unwrap());
        let ctx = PacketContext::dummy();
        let p1 = recv.receive(ctx, packet(10, 1000, 0xaaaa), 1000).unwrap();
        assert_eq!(p1.sequence_number, 10);
        assert_eq!(p1.timestamp.elapsed(), 0);
        let p2 = recv.receive(ctx, packet(11, 1100, 0xaaaa), 1100).unwrap();
        assert_eq!(p2.timestamp.elapsed(), 100);
        assert_eq!(recv.stats().unwrap().received, 2);
    }

    #[test]
    fn malformed_packet_is_dropped_and_counted() {
        let mut recv = RtpReceiver::new(0, std::num::NonZeroU32::new(90_000).unwrap());
        let ctx = PacketContext::dummy();
        let bad = Bytes::from(vec![0x80, 96, 0, 1]); // too short
        assert!(recv.receive(ctx, bad, 0).is_none());
        assert_eq!(recv.dropped_malformed(), 1);
    }

    #[test]
    fn ssrc_change_restarts_tracking() {
        let mut recv = RtpReceiver::new(0, std::num::NonZeroU32::new(8000).unwrap());
        let ctx = PacketContext::dummy();
        recv.receive(ctx, packet(5, 0, 1), 0);
        recv.receive(ctx, packet(5000, 0, 2), 0);
        assert_eq!(recv.stats().unwrap().ssrc, 2);
    }
}
