// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small CLI that connects to an RTSP server, plays every negotiable
//! track, and logs RTP/RTCP activity until interrupted.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Error;
use camrtsp::client::{Credentials, Event, Session, SessionOptions, TransportPreference};
use log::{error, info, warn};
use structopt::StructOpt;

#[derive(StructOpt)]
struct Opts {
    #[structopt(long, parse(try_from_str))]
    url: url::Url,

    #[structopt(long, requires = "password")]
    username: Option<String>,

    #[structopt(long, requires = "username")]
    password: Option<String>,

    /// Forces RTSP-interleaved-TCP transport instead of UDP.
    #[structopt(long)]
    tcp: bool,
}

fn init_logging() -> mylog::Handle {
    let h = mylog::Builder::new()
        .set_format(
            ::std::env::var("MOONFIRE_FORMAT")
                .map_err(|_| ())
                .and_then(|s| mylog::Format::from_str(&s))
                .unwrap_or(mylog::Format::Google),
        )
        .set_spec(::std::env::var("MOONFIRE_LOG").as_deref().unwrap_or("info"))
        .build();
    h.clone().install().unwrap();
    h
}

#[tokio::main]
async fn main() {
    let mut h = init_logging();
    if let Err(e) = {
        let _a = h.async_scope();
        main_inner().await
    } {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
    info!("Done");
}

/// Interprets the `username` and `password` of an [`Opts`].
fn creds(username: Option<String>, password: Option<String>) -> Option<Credentials> {
    match (username, password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        (None, None) => None,
        _ => unreachable!(), // structopt enforces username and password's mutual "requires".
    }
}

async fn main_inner() -> Result<(), Error> {
    let opts = Opts::from_args();
    let options = SessionOptions {
        creds: creds(opts.username, opts.password),
        ..SessionOptions::default()
    };

    let mut session = Session::connect(opts.url.as_str(), options).await?;
    session.options().await?;
    session.describe().await?;

    let pref = if opts.tcp {
        TransportPreference::TcpInterleaved
    } else {
        TransportPreference::Udp
    };
    for i in 0..session.tracks().len() {
        if let Err(e) = session.setup(i, pref).await {
            warn!("SETUP failed for track {}: {}", i, e);
        }
    }
    session.play().await?;
    info!("playing {} track(s)", session.tracks().len());

    let result = session
        .run_until_teardown(|event| match event {
            Event::Rtp { track_index, packet } => {
                info!(
                    "track {}: rtp seq={} ts={} {} bytes",
                    track_index,
                    packet.sequence_number,
                    packet.timestamp,
                    packet.payload.len()
                );
            }
            Event::SenderReport { track_index } => {
                info!("track {}: received sender report", track_index);
            }
            Event::Bye { track_index } => {
                info!("track {}: server sent BYE", track_index);
            }
        })
        .await;
    if let Err(e) = result {
        warn!("session loop ended: {}", e);
    }

    session.teardown().await?;
    Ok(())
}
