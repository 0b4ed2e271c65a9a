mod config;

use anyhow::Result;
use clap::Parser;
use tether::{Channel, Host, HostEvent};

use config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut host = Host::bind(args.bind_addr()?, args.host_config()).await?;
    log::info!("Server started on {}", host.local_addr());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = host.next_event() => match event {
                Some(event) => handle_event(&host, &event, args.echo),
                None => break,
            },
        }
    }

    log::info!("Server shutting down");
    host.shutdown().await;
    Ok(())
}

fn handle_event(host: &Host, event: &HostEvent, echo: bool) {
    match event {
        HostEvent::PeerConnected { peer_id, addr } => {
            log::info!("Peer {} connected from {}", peer_id, addr);
        }
        HostEvent::PeerDisconnected { peer_id, reason } => {
            log::info!("Peer {} {}", peer_id, reason.as_str());
        }
        HostEvent::ConnectionDenied { addr, reason } => {
            log::warn!("Connection denied to {}: {}", addr, reason);
        }
        HostEvent::DatagramBound { peer_id, addr } => {
            log::debug!("Peer {} datagrams from {}", peer_id, addr);
        }
        HostEvent::ClockSyncRequested { peer_id } => {
            log::trace!("Peer {} requested time sync", peer_id);
        }
        HostEvent::DataReceived {
            peer_id,
            channel,
            payload,
        } => {
            log::info!("Peer {} sent {} bytes ({:?})", peer_id, payload.len(), channel);
            if !echo {
                return;
            }
            let result = match channel {
                Channel::Reliable => host.send(*peer_id, payload.clone()),
                Channel::Unreliable => host.send_unreliable(*peer_id, payload.clone()),
            };
            if let Err(e) = result {
                log::error!("Echo to peer {} failed: {}", peer_id, e);
            }
        }
    }
}
