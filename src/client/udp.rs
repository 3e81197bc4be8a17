// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paired UDP sockets for one track: RTP on an even port, RTCP on the next
//! odd port, bound before the `SETUP` offer is sent so the port numbers in
//! the `Transport` header are guaranteed available.

use std::net::{IpAddr, SocketAddr};

use rand::Rng;
use tokio::net::UdpSocket;

use crate::error::{Error, ErrorInt};

const MAX_TRIES: u32 = 10;
const ALLOWED_RTP_PORT_RANGE: std::ops::Range<u16> = 5000..65000;

/// A bound RTP/RTCP socket pair for one track, with `rtp_port` guaranteed even.
pub struct UdpPair {
    pub rtp_port: u16,
    pub rtp_socket: UdpSocket,
    pub rtcp_socket: UdpSocket,
}

impl UdpPair {
    /// Binds a consecutive even/odd UDP port pair on `ip`, retrying with a
    /// freshly chosen even port if either bind fails (eg already in use).
    pub async fn for_ip(ip: IpAddr) -> Result<Self, Error> {
        for _ in 0..MAX_TRIES {
            let rtp_port = rand::thread_rng().gen_range(ALLOWED_RTP_PORT_RANGE) & !1u16;
            let rtp_addr = SocketAddr::new(ip, rtp_port);
            let rtcp_addr = SocketAddr::new(ip, rtp_port + 1);
            let rtp_socket = match UdpSocket::bind(rtp_addr).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            let rtcp_socket = match UdpSocket::bind(rtcp_addr).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            return Ok(UdpPair {
                rtp_port,
                rtp_socket,
                rtcp_socket,
            });
        }
        Err(wrap!(ErrorInt::ConnectError {
            address: SocketAddr::new(ip, 0),
            source: std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("unable to bind an RTP/RTCP port pair after {} tries", MAX_TRIES),
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_consecutive_even_odd_ports() {
        let pair = UdpPair::for_ip(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
            .await
            .unwrap();
        assert_eq!(pair.rtp_port % 2, 0);
        assert_eq!(
            pair.rtcp_socket.local_addr().unwrap().port(),
            pair.rtp_port + 1
        );
    }
}
