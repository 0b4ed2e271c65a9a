mod config;

use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tether::{Channel, Client, ClientEvent};

use config::Args;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut client = Client::new(args.client_config())?;
    let mut events = client.subscribe();

    client.connect(args.host.clone(), args.port.clone())?;

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut connected = false;

    while Instant::now() < deadline {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(_) => {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        match event {
            ClientEvent::Connected { peer_id } => {
                log::info!("Connected as peer {}", peer_id);
                connected = true;
                if let Some(message) = &args.message {
                    client.send(message.as_bytes())?;
                    client.send_unreliable(message.as_bytes())?;
                }
            }
            ClientEvent::Disconnected { peer_id, reason } => {
                match peer_id {
                    Some(peer_id) => log::info!("Peer {} {}", peer_id, reason.as_str()),
                    None => log::warn!("Connection failed: {}", reason.as_str()),
                }
                break;
            }
            ClientEvent::DataReceived {
                channel, payload, ..
            } => {
                let label = match channel {
                    Channel::Reliable => "reliable",
                    Channel::Unreliable => "unreliable",
                };
                log::info!(
                    "Received {} bytes ({}): {}",
                    payload.len(),
                    label,
                    String::from_utf8_lossy(&payload)
                );
            }
            ClientEvent::ClockSample { sample, .. } => {
                log::info!(
                    "Clock sample: rtt {} ms, offset {} ms",
                    sample.round_trip_ms(),
                    sample.offset_ms()
                );
            }
        }
    }

    if connected {
        client.disconnect()?;
    }
    client.shutdown();
    Ok(())
}
