// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTCP compound packets, per [RFC 3550 §6](https://datatracker.ietf.org/doc/html/rfc3550#section-6).
//!
//! Parsing style is grounded on this pack's zero-dependency RTCP header
//! parser (`Header::try_from(&[u8])`, walking a compound packet by its
//! `(length+1)*4` byte count): each sub-packet's header is decoded the same
//! way, and unknown packet types are skipped rather than rejected, since a
//! compound packet commonly mixes packet types this crate doesn't act on
//! (e.g. APP) with ones it does.

use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

const RTCP_VERSION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Bye,
    App,
    Unknown(u8),
}

impl PacketType {
    fn from_u8(b: u8) -> Self {
        match b {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Bye,
            204 => PacketType::App,
            other => PacketType::Unknown(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Bye => 203,
            PacketType::App => 204,
            PacketType::Unknown(b) => b,
        }
    }
}

/// A single report block within an SR or RR packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
    pub extended_highest_sequence_number: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

#[derive(Debug, Clone)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: SmallVec<[ReportBlock; 1]>,
}

#[derive(Debug, Clone)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: SmallVec<[ReportBlock; 1]>,
}

#[derive(Debug, Clone)]
pub struct SourceDescription {
    pub ssrc: u32,
    pub cname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Bye {
    pub ssrcs: SmallVec<[u32; 1]>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Packet {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(SourceDescription),
    Bye(Bye),
    Unknown { pt: u8 },
}

/// Parses a full compound RTCP packet (one or more sub-packets back to back).
///
/// Per RFC 3550 §6.1, a compound packet's sub-packets each have their own
/// version/length fields; this walks them one at a time using each header's
/// `(length+1)*4` byte count, rejecting only malformed framing (a declared
/// length that would run past the buffer, or an unsupported version).
/// Unknown packet types are kept as `Packet::Unknown` rather than dropped so
/// a caller that only wants SR/RR/BYE can still see which sub-packets it
/// didn't understand.
pub fn parse_compound(mut data: &[u8]) -> Result<Vec<Packet>, String> {
    let mut packets = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err("truncated RTCP header".to_owned());
        }
        let b0 = data[0];
        let version = (b0 & 0b1100_0000) >> 6;
        if version != RTCP_VERSION {
            return Err(format!("unsupported RTCP version {}", version));
        }
        let padding = (b0 & 0b0010_0000) != 0;
        let rc = (b0 & 0b0001_1111) as usize;
        let pt = PacketType::from_u8(data[1]);
        let length_words = u16::from_be_bytes([data[2], data[3]]) as usize;
        let total_len = (length_words + 1) * 4;
        if data.len() < total_len {
            return Err(format!(
                "RTCP sub-packet declares {} bytes but only {} remain",
                total_len,
                data.len()
            ));
        }
        let body = &data[4..total_len];
        let body = if padding {
            let pad = *body.last().ok_or("RTCP padding flag set but empty body")? as usize;
            if pad == 0 || pad > body.len() {
                return Err(format!("invalid RTCP padding length {}", pad));
            }
            &body[..body.len() - pad]
        } else {
            body
        };

        packets.push(parse_one(pt, rc, body)?);
        data = &data[total_len..];
    }
    Ok(packets)
}

fn parse_report_block(b: &[u8]) -> Result<ReportBlock, String> {
    if b.len() < 24 {
        return Err("truncated RTCP report block".to_owned());
    }
    let ssrc = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    let fraction_lost = b[4];
    // cumulative packets lost is a signed 24-bit two's-complement integer.
    let raw = ((b[5] as u32) << 16) | ((b[6] as u32) << 8) | (b[7] as u32);
    let cumulative_lost = sign_extend_24(raw);
    let extended_highest_sequence_number = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
    let jitter = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
    let last_sr = u32::from_be_bytes([b[16], b[17], b[18], b[19]]);
    let delay_since_last_sr = u32::from_be_bytes([b[20], b[21], b[22], b[23]]);
    Ok(ReportBlock {
        ssrc,
        fraction_lost,
        cumulative_lost,
        extended_highest_sequence_number,
        jitter,
        last_sr,
        delay_since_last_sr,
    })
}

fn sign_extend_24(raw: u32) -> i32 {
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// Clamps a running cumulative-loss count to the signed 24-bit range an SR/RR
/// report block can represent, per RFC 3550 §6.4.1.
pub fn clamp_cumulative_lost(count: i64) -> i32 {
    const MAX: i64 = 0x007F_FFFF;
    const MIN: i64 = -0x0080_0000;
    count.clamp(MIN, MAX) as i32
}

fn parse_one(pt: PacketType, rc: usize, body: &[u8]) -> Result<Packet, String> {
    match pt {
        PacketType::SenderReport => {
            if body.len() < 20 {
                return Err("truncated SR".to_owned());
            }
            let ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            let ntp_msw = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
            let ntp_lsw = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
            let ntp_timestamp = ((ntp_msw as u64) << 32) | (ntp_lsw as u64);
            let rtp_timestamp = u32::from_be_bytes([body[12], body[13], body[14], body[15]]);
            let packet_count = u32::from_be_bytes([body[16], body[17], body[18], body[19]]);
            let octet_count = u32::from_be_bytes([body[20], body[21], body[22], body[23]]);
            let mut reports = SmallVec::with_capacity(rc);
            let mut off = 24;
            for _ in 0..rc {
                reports.push(parse_report_block(&body[off..])?);
                off += 24;
            }
            Ok(Packet::Sr(SenderReport {
                ssrc,
                ntp_timestamp,
                rtp_timestamp,
                packet_count,
                octet_count,
                reports,
            }))
        }
        PacketType::ReceiverReport => {
            if body.len() < 4 {
                return Err("truncated RR".to_owned());
            }
            let ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            let mut reports = SmallVec::with_capacity(rc);
            let mut off = 4;
            for _ in 0..rc {
                reports.push(parse_report_block(&body[off..])?);
                off += 24;
            }
            Ok(Packet::Rr(ReceiverReport { ssrc, reports }))
        }
        PacketType::SourceDescription => {
            // SDES: `rc` chunks of SSRC + 1-or-more {type,len,text} items,
            // terminated by a zero type byte, each chunk padded to 4 bytes.
            // This crate only surfaces CNAME (type 1), the only item
            // required per RFC 3550 §6.5.1.
            let mut ssrc = 0u32;
            let mut cname = None;
            let mut off = 0;
            for _ in 0..rc {
                if body.len() < off + 4 {
                    break;
                }
                ssrc = u32::from_be_bytes([body[off], body[off + 1], body[off + 2], body[off + 3]]);
                off += 4;
                let chunk_start = off;
                loop {
                    if off >= body.len() || body[off] == 0 {
                        off += 1;
                        break;
                    }
                    let item_type = body[off];
                    let item_len = body[off + 1] as usize;
                    let text_start = off + 2;
                    let text_end = text_start + item_len;
                    if text_end > body.len() {
                        break;
                    }
                    if item_type == 1 {
                        cname = Some(String::from_utf8_lossy(&body[text_start..text_end]).into_owned());
                    }
                    off = text_end;
                }
                let chunk_len = off - chunk_start;
                let padded = (chunk_len + 3) & !3;
                off = chunk_start + padded;
            }
            Ok(Packet::Sdes(SourceDescription { ssrc, cname }))
        }
        PacketType::Bye => {
            let mut ssrcs = SmallVec::with_capacity(rc);
            let mut off = 0;
            for _ in 0..rc {
                if body.len() < off + 4 {
                    break;
                }
                ssrcs.push(u32::from_be_bytes([
                    body[off],
                    body[off + 1],
                    body[off + 2],
                    body[off + 3],
                ]));
                off += 4;
            }
            let reason = if body.len() > off {
                let len = body[off] as usize;
                let start = off + 1;
                let end = (start + len).min(body.len());
                Some(String::from_utf8_lossy(&body[start..end]).into_owned())
            } else {
                None
            };
            Ok(Packet::Bye(Bye { ssrcs, reason }))
        }
        PacketType::App | PacketType::Unknown(_) => Ok(Packet::Unknown { pt: pt.to_u8() }),
    }
}

/// Serializes a receiver report plus an SDES CNAME item as a single compound
/// packet, the shape this crate's RTCP exchange sends back to the server
/// per RFC 3550 §6.2.
pub fn serialize_rr_sdes(ssrc: u32, reports: &[ReportBlock], cname: &str) -> Bytes {
    let mut buf = BytesMut::new();

    // RR
    let rc = reports.len().min(31);
    buf.put_u8((RTCP_VERSION << 6) | (rc as u8));
    buf.put_u8(PacketType::ReceiverReport.to_u8());
    let rr_len_words = 1 + rc * 6; // ssrc word + 6 words/report block, excluding the header word itself
    buf.put_u16(rr_len_words as u16);
    buf.put_u32(ssrc);
    for r in &reports[..rc] {
        buf.put_u32(r.ssrc);
        buf.put_u8(r.fraction_lost);
        let cum = r.cumulative_lost.clamp(-0x0080_0000, 0x007F_FFFF) as u32 & 0x00FF_FFFF;
        buf.put_u8((cum >> 16) as u8);
        buf.put_u8((cum >> 8) as u8);
        buf.put_u8(cum as u8);
        buf.put_u32(r.extended_highest_sequence_number);
        buf.put_u32(r.jitter);
        buf.put_u32(r.last_sr);
        buf.put_u32(r.delay_since_last_sr);
    }

    // SDES with a single CNAME chunk
    let sdes_start = buf.len();
    buf.put_u8((RTCP_VERSION << 6) | 1u8); // rc=1 chunk
    buf.put_u8(PacketType::SourceDescription.to_u8());
    buf.put_u16(0); // patched below
    buf.put_u32(ssrc);
    buf.put_u8(1); // CNAME
    let cname_bytes = cname.as_bytes();
    buf.put_u8(cname_bytes.len().min(255) as u8);
    buf.put_slice(&cname_bytes[..cname_bytes.len().min(255)]);
    buf.put_u8(0); // terminator
    while (buf.len() - sdes_start) % 4 != 0 {
        buf.put_u8(0);
    }
    let sdes_len_words = ((buf.len() - sdes_start) / 4) - 1;
    buf[sdes_start + 2..sdes_start + 4].copy_from_slice(&(sdes_len_words as u16).to_be_bytes());

    buf.freeze()
}

/// Serializes a BYE packet for the given SSRCs.
pub fn serialize_bye(ssrcs: &[u32]) -> Bytes {
    let mut buf = BytesMut::new();
    let rc = ssrcs.len().min(31);
    buf.put_u8((RTCP_VERSION << 6) | (rc as u8));
    buf.put_u8(PacketType::Bye.to_u8());
    buf.put_u16(rc as u16);
    for ssrc in &ssrcs[..rc] {
        buf.put_u32(*ssrc);
    }
    buf.freeze()
}

/// Running per-SSRC RTCP statistics an RTP receiver accumulates to fill in
/// the next outbound receiver report, per RFC 3550 Appendix A.8 (jitter) and
/// §6.4.1 (loss fields).
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    pub ssrc: u32,
    /// Highest sequence number received, extended with cycle count (`s_max` combined
    /// with the cycle count from Appendix A.1).
    pub max_seq: u16,
    pub cycles: u32,
    pub base_seq: u32,
    pub received: u64,
    pub expected_prior: u64,
    pub received_prior: u64,
    /// Interarrival jitter estimate, in timestamp units (Appendix A.8).
    pub jitter: f64,
    transit: Option<i64>,
    pub last_sr_ntp: u64,
    pub last_sr_received_at: Option<std::time::Instant>,
}

impl ReceiverStats {
    pub fn new(ssrc: u32, initial_seq: u16) -> Self {
        ReceiverStats {
            ssrc,
            max_seq: initial_seq,
            cycles: 0,
            base_seq: initial_seq as u32,
            received: 1,
            expected_prior: 0,
            received_prior: 0,
            jitter: 0.0,
            transit: None,
            last_sr_ntp: 0,
            last_sr_received_at: None,
        }
    }

    pub fn extended_highest_sequence_number(&self) -> u32 {
        (self.cycles << 16) | self.max_seq as u32
    }

    /// Updates sequence-number tracking for a newly-received packet. `seq` wraps
    /// at 16 bits; a large backward jump bumps the cycle counter per Appendix A.1.
    pub fn record_sequence(&mut self, seq: u16) {
        self.received += 1;
        let udelta = seq.wrapping_sub(self.max_seq);
        const MAX_DROPOUT: u16 = 3000;
        const MAX_MISORDER: u16 = 100;
        if udelta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles = self.cycles.wrapping_add(1);
            }
            self.max_seq = seq;
        } else if udelta <= 65536 - MAX_MISORDER {
            // out of order or duplicate, within tolerance: ignore for max_seq purposes
        } else {
            // a jump large enough to look like a restarted source; re-sync.
            self.base_seq = seq as u32;
            self.max_seq = seq;
            self.cycles = 0;
        }
    }

    /// Updates the jitter estimate given this packet's RTP timestamp and the
    /// arrival time expressed in the same clock-rate units, per Appendix A.8.
    pub fn record_jitter(&mut self, rtp_timestamp: u32, arrival_timestamp: u32) {
        let transit = arrival_timestamp as i64 - rtp_timestamp as i64;
        if let Some(prev) = self.transit {
            let d = (transit - prev).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.transit = Some(transit);
    }

    pub fn expected(&self) -> u64 {
        (self.extended_highest_sequence_number() as u64) - (self.base_seq as u64) + 1
    }

    pub fn cumulative_lost(&self) -> i32 {
        let expected = self.expected();
        clamp_cumulative_lost(expected as i64 - self.received as i64)
    }

    /// Fraction lost since the previous report, per §6.4.1: `(expected_interval
    /// - received_interval) / expected_interval`, scaled to a byte (0..=255).
    pub fn fraction_lost(&mut self) -> u8 {
        let expected = self.expected();
        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.received.saturating_sub(self.received_prior);
        self.expected_prior = expected;
        self.received_prior = self.received;
        if expected_interval == 0 || received_interval >= expected_interval {
            0
        } else {
            let lost_interval = expected_interval - received_interval;
            ((lost_interval << 8) / expected_interval) as u8
        }
    }

    pub fn to_report_block(&mut self, lsr: u32, dlsr: u32) -> ReportBlock {
        ReportBlock {
            ssrc: self.ssrc,
            fraction_lost: self.fraction_lost(),
            cumulative_lost: self.cumulative_lost(),
            extended_highest_sequence_number: self.extended_highest_sequence_number(),
            jitter: self.jitter as u32,
            last_sr: lsr,
            delay_since_last_sr: dlsr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sr_bytes(ssrc: u32, ntp: u64, rtp_ts: u32, pkts: u32, octets: u32) -> Vec<u8> {
        let mut v = vec![(RTCP_VERSION << 6) | 0u8, 200];
        v.extend_from_slice(&6u16.to_be_bytes()); // length words: 6 (24 bytes / 4) since rc=0
        v.extend_from_slice(&ssrc.to_be_bytes());
        v.extend_from_slice(&((ntp >> 32) as u32).to_be_bytes());
        v.extend_from_slice(&(ntp as u32).to_be_bytes());
        v.extend_from_slice(&rtp_ts.to_be_bytes());
        v.extend_from_slice(&pkts.to_be_bytes());
        v.extend_from_slice(&octets.to_be_bytes());
        v
    }

    #[test]
    fn parses_sender_report() {
        let raw = sr_bytes(0x1234, 0x1_0000_0002, 9000, 10, 2000);
        let packets = parse_compound(&raw).unwrap();
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            Packet::Sr(sr) => {
                assert_eq!(sr.ssrc, 0x1234);
                assert_eq!(sr.ntp_timestamp, 0x1_0000_0002);
                assert_eq!(sr.rtp_timestamp, 9000);
                assert_eq!(sr.packet_count, 10);
                assert_eq!(sr.octet_count, 2000);
                assert!(sr.reports.is_empty());
            }
            _ => panic!("expected SR"),
        }
    }

    #[test]
    fn parses_compound_sr_plus_bye() {
        let mut raw = sr_bytes(1, 0, 0, 0, 0);
        let bye = serialize_bye(&[1]);
        raw.extend_from_slice(&bye);
        let packets = parse_compound(&raw).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[0], Packet::Sr(_)));
        match &packets[1] {
            Packet::Bye(b) => assert_eq!(&b.ssrcs[..], &[1]),
            _ => panic!("expected BYE"),
        }
    }

    #[test]
    fn rejects_truncated_length() {
        let mut raw = sr_bytes(1, 0, 0, 0, 0);
        raw.truncate(raw.len() - 4);
        assert!(parse_compound(&raw).is_err());
    }

    #[test]
    fn roundtrips_rr_sdes() {
        let mut stats = ReceiverStats::new(42, 100);
        stats.record_sequence(101);
        stats.record_sequence(102);
        let block = stats.to_report_block(0, 0);
        let raw = serialize_rr_sdes(99, &[block], "camrtsp@session");
        let packets = parse_compound(&raw).unwrap();
        assert_eq!(packets.len(), 2);
        match &packets[0] {
            Packet::Rr(rr) => {
                assert_eq!(rr.ssrc, 99);
                assert_eq!(rr.reports.len(), 1);
                assert_eq!(rr.reports[0].ssrc, 42);
            }
            _ => panic!("expected RR"),
        }
        match &packets[1] {
            Packet::Sdes(sdes) => {
                assert_eq!(sdes.ssrc, 99);
                assert_eq!(sdes.cname.as_deref(), Some("camrtsp@session"));
            }
            _ => panic!("expected SDES"),
        }
    }

    #[test]
    fn cumulative_lost_clamps_to_signed_24_bit() {
        assert_eq!(clamp_cumulative_lost(10_000_000), 0x007F_FFFF);
        assert_eq!(clamp_cumulative_lost(-10_000_000), -0x0080_0000);
        assert_eq!(clamp_cumulative_lost(5), 5);
    }

    #[test]
    fn sequence_tracking_handles_wrap() {
        let mut stats = ReceiverStats::new(1, 0xFFFE);
        stats.record_sequence(0xFFFF);
        stats.record_sequence(0x0000);
        stats.record_sequence(0x0001);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.extended_highest_sequence_number(), 0x0001_0001);
    }
}
