// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RTCP half of a track's exchange: periodic outbound receiver reports
//! and handling of inbound SR/SDES/BYE, per RFC 3550 §6.

use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;

use crate::proto::rtcp::{self, Packet as RtcpPacket, ReportBlock};

/// Floor on the RTCP reporting interval, per RFC 3550 §6.2.
pub const MIN_RTCP_INTERVAL: Duration = Duration::from_secs(5);

/// Picks the next outbound RTCP interval: `base` (at least
/// [`MIN_RTCP_INTERVAL`]) randomized to `[0.5T, 1.5T]`, per RFC 3550 §6.2,
/// to avoid every session's reports synchronizing in lockstep.
pub fn next_interval(base: Duration) -> Duration {
    let base = base.max(MIN_RTCP_INTERVAL);
    let factor = rand::thread_rng().gen_range(0.5..1.5_f64);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

/// What this track's RTCP exchange has learned about the remote sender,
/// fed by inbound SR/SDES/BYE packets.
#[derive(Debug, Default)]
pub struct InboundState {
    /// Middle 32 bits of the last SR's NTP timestamp (the wire's `LSR`).
    pub last_sr_middle32: u32,
    last_sr_received_at: Option<Instant>,
    pub cname: Option<String>,
    pub left: bool,
}

impl InboundState {
    /// Applies one inbound compound RTCP packet's sub-packets to this state.
    pub fn apply(&mut self, packets: &[RtcpPacket]) {
        for p in packets {
            match p {
                RtcpPacket::Sr(sr) => {
                    self.last_sr_middle32 = crate::NtpTimestamp(sr.ntp_timestamp).middle32();
                    self.last_sr_received_at = Some(Instant::now());
                }
                RtcpPacket::Sdes(sdes) => {
                    if let Some(cname) = &sdes.cname {
                        self.cname = Some(cname.clone());
                    }
                }
                RtcpPacket::Bye(_) => self.left = true,
                RtcpPacket::Rr(_) | RtcpPacket::Unknown { .. } => {}
            }
        }
    }

    /// `DLSR`, in units of 1/65536 s, since the last SR; 0 if none received.
    pub fn delay_since_last_sr(&self) -> u32 {
        match self.last_sr_received_at {
            Some(at) => (at.elapsed().as_secs_f64() * 65536.0) as u32,
            None => 0,
        }
    }
}

/// Builds the outbound compound RR+SDES packet this session sends for its
/// local SSRC, with one report block per track with a remote SSRC known.
pub fn build_receiver_report(local_ssrc: u32, cname: &str, reports: &[ReportBlock]) -> Bytes {
    rtcp::serialize_rr_sdes(local_ssrc, reports, cname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::rtcp::parse_compound;

    #[test]
    fn interval_is_within_bounds() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let got = next_interval(base);
            assert!(got >= Duration::from_secs(5));
            assert!(got <= Duration::from_secs(15));
        }
    }

    #[test]
    fn floor_applies_to_small_base() {
        let got = next_interval(Duration::from_secs(1));
        assert!(got >= MIN_RTCP_INTERVAL.mul_f64(0.5));
    }

    #[test]
    fn inbound_state_tracks_sr_and_bye() {
        let raw = crate::proto::rtcp::serialize_bye(&[42]);
        let packets = parse_compound(&raw).unwrap();
        let mut state = InboundState::default();
        state.apply(&packets);
        assert!(state.left);
    }
}
