// SPDX-License-Identifier: MIT OR Apache-2.0

//! A track: one SDP media entry selected for playback, and the `Transport`
//! descriptor negotiated for it by `SETUP`.

use crate::sdp::MediaDescription;

/// The negotiated carrier for one track's RTP/RTCP, per `SETUP`'s response
/// `Transport` header. Immutable once set, per this crate's invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportDescriptor {
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: u16,
        server_rtp_port: Option<u16>,
        server_rtcp_port: Option<u16>,
        ssrc: Option<u32>,
    },
    TcpInterleaved { rtp_channel: u8, rtcp_channel: u8 },
}

/// The transport a caller asks `SETUP` to negotiate. Only unicast is
/// supported; multicast coordination beyond joining a server-specified
/// group is out of scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportPreference {
    Udp,
    TcpInterleaved,
}

/// One SDP media entry selected for playback.
#[derive(Clone, Debug)]
pub struct Track {
    pub media: String,
    pub rtp_payload_type: u8,
    pub encoding_name: Option<String>,
    pub clock_rate: Option<std::num::NonZeroU32>,
    /// The track's `a=control:` URL, already resolved against the SDP's
    /// content base (see [`crate::sdp::resolve_control`]).
    pub control_url: String,
    pub transport: Option<TransportDescriptor>,
}

impl Track {
    pub(crate) fn new(control_url: String, media: &MediaDescription) -> Self {
        Track {
            media: media.media.clone(),
            rtp_payload_type: media.rtp_payload_type,
            encoding_name: media.encoding_name.clone(),
            clock_rate: media.clock_rate.and_then(std::num::NonZeroU32::new),
            control_url,
            transport: None,
        }
    }
}
