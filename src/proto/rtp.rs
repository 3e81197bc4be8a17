// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTP packet parsing, per [RFC 3550 §5](https://datatracker.ietf.org/doc/html/rfc3550#section-5).
//!
//! Parses the fixed header (version, padding, extension, CSRC count, marker,
//! payload type, sequence number, timestamp, SSRC), the CSRC list, and an
//! optional extension header, and trims padding, handing back the payload as
//! a zero-copy view into the input.

use bytes::Bytes;
use smallvec::SmallVec;

const MIN_HEADER_LEN: usize = 12;

/// A parsed RTP header, with `payload` as a zero-copy view into the input.
#[derive(Debug, Clone)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: SmallVec<[u32; 4]>,
}

/// A parsed RTP packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: RtpHeader,
    pub payload: Bytes,
}

/// Parses one RTP packet from `data`.
///
/// Rejects packets with `V != 2`, length `< 12`, or length `< 12 + 4*CC`, per
/// the core's RTP parse rules. If the extension bit is set, the extension
/// header is skipped (its content isn't exposed; no caller currently needs
/// it). If the padding bit is set, the last payload byte's value is trimmed
/// from the payload end.
pub fn parse(data: Bytes) -> Result<Packet, String> {
    if data.len() < MIN_HEADER_LEN {
        return Err(format!(
            "RTP packet too short: {} < {}",
            data.len(),
            MIN_HEADER_LEN
        ));
    }
    let b0 = data[0];
    let version = (b0 & 0b1100_0000) >> 6;
    if version != 2 {
        return Err(format!("unsupported RTP version {}", version));
    }
    let padding = (b0 & 0b0010_0000) != 0;
    let extension = (b0 & 0b0001_0000) != 0;
    let cc = (b0 & 0b0000_1111) as usize;

    let b1 = data[1];
    let marker = (b1 & 0b1000_0000) != 0;
    let payload_type = b1 & 0b0111_1111;

    let header_len = MIN_HEADER_LEN + 4 * cc;
    if data.len() < header_len {
        return Err(format!(
            "RTP packet too short for CC={}: {} < {}",
            cc,
            data.len(),
            header_len
        ));
    }

    let sequence_number = u16::from_be_bytes([data[2], data[3]]);
    let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

    let mut csrc = SmallVec::with_capacity(cc);
    for i in 0..cc {
        let off = MIN_HEADER_LEN + 4 * i;
        csrc.push(u32::from_be_bytes([
            data[off],
            data[off + 1],
            data[off + 2],
            data[off + 3],
        ]));
    }

    let mut payload_start = header_len;
    if extension {
        if data.len() < payload_start + 4 {
            return Err("RTP extension header truncated".to_owned());
        }
        let ext_len_words = u16::from_be_bytes([data[payload_start + 2], data[payload_start + 3]]) as usize;
        let ext_total = 4 + 4 * ext_len_words;
        if data.len() < payload_start + ext_total {
            return Err("RTP extension payload truncated".to_owned());
        }
        payload_start += ext_total;
    }

    let mut payload_end = data.len();
    if padding {
        if payload_end <= payload_start {
            return Err("RTP padding flag set but no payload".to_owned());
        }
        let pad_len = data[payload_end - 1] as usize;
        if pad_len == 0 || pad_len > payload_end - payload_start {
            return Err(format!("invalid RTP padding length {}", pad_len));
        }
        payload_end -= pad_len;
    }

    let payload = data.slice(payload_start..payload_end);

    Ok(Packet {
        header: RtpHeader {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
        },
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(seq: u16, ts: u32, ssrc: u32, marker: bool, pt: u8) -> Vec<u8> {
        let mut v = vec![0x80, if marker { 0x80 | pt } else { pt }];
        v.extend_from_slice(&seq.to_be_bytes());
        v.extend_from_slice(&ts.to_be_bytes());
        v.extend_from_slice(&ssrc.to_be_bytes());
        v
    }

    #[test]
    fn parses_minimal_packet() {
        let mut raw = basic_header(1, 1000, 0xdead_beef, true, 96);
        raw.extend_from_slice(b"payload");
        let pkt = parse(Bytes::from(raw)).unwrap();
        assert_eq!(pkt.header.version, 2);
        assert_eq!(pkt.header.sequence_number, 1);
        assert_eq!(pkt.header.timestamp, 1000);
        assert_eq!(pkt.header.ssrc, 0xdead_beef);
        assert!(pkt.header.marker);
        assert_eq!(pkt.header.payload_type, 96);
        assert_eq!(&pkt.payload[..], b"payload");
        assert!(pkt.header.csrc.is_empty());
    }

    #[test]
    fn rejects_bad_version() {
        let mut raw = basic_header(1, 0, 0, false, 0);
        raw[0] = 0x40; // version 1
        assert!(parse(Bytes::from(raw)).is_err());
    }

    #[test]
    fn rejects_too_short() {
        assert!(parse(Bytes::from(vec![0x80; 8])).is_err());
    }

    #[test]
    fn parses_csrc_list() {
        let mut raw = vec![0x82, 96]; // CC=2
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.extend_from_slice(&1000u32.to_be_bytes());
        raw.extend_from_slice(&0xaaaa_bbbbu32.to_be_bytes());
        raw.extend_from_slice(&0x1111_1111u32.to_be_bytes());
        raw.extend_from_slice(&0x2222_2222u32.to_be_bytes());
        raw.extend_from_slice(b"xy");
        let pkt = parse(Bytes::from(raw)).unwrap();
        assert_eq!(&pkt.header.csrc[..], &[0x1111_1111, 0x2222_2222]);
        assert_eq!(&pkt.payload[..], b"xy");
    }

    #[test]
    fn rejects_short_csrc() {
        let mut raw = vec![0x81, 96];
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.extend_from_slice(&1000u32.to_be_bytes());
        raw.extend_from_slice(&0xaaaa_bbbbu32.to_be_bytes());
        // missing the one CSRC word
        assert!(parse(Bytes::from(raw)).is_err());
    }

    #[test]
    fn trims_padding() {
        let mut raw = basic_header(1, 0, 0, false, 0);
        raw[0] |= 0b0010_0000; // padding bit
        raw.extend_from_slice(b"data");
        raw.push(2); // trim 2 bytes (including this one)
        let pkt = parse(Bytes::from(raw)).unwrap();
        assert_eq!(&pkt.payload[..], b"dat");
    }

    #[test]
    fn skips_extension_header() {
        let mut raw = basic_header(1, 0, 0, false, 0);
        raw[0] |= 0b0001_0000; // extension bit
        raw.extend_from_slice(&0xBEDEu16.to_be_bytes()); // ext id
        raw.extend_from_slice(&1u16.to_be_bytes()); // 1 word of extension data
        raw.extend_from_slice(&[0u8; 4]);
        raw.extend_from_slice(b"payload");
        let pkt = parse(Bytes::from(raw)).unwrap();
        assert_eq!(&pkt.payload[..], b"payload");
    }
}
