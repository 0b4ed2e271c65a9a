//! Accepting side of the session protocol: assigns peer ids, answers time
//! sync requests and routes datagrams by the port each peer announces.

mod actor;
mod config;
mod events;
mod routing;

use std::net::SocketAddr;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::net::{NetError, PeerId};

pub use config::HostConfig;
pub use events::{HostEvent, LeaveReason};
pub use routing::RoutingTable;

use events::HostCommand;

/// Listens for stream connections and datagrams on the same address. Must be
/// created inside a tokio runtime; the host runs as a task on it.
pub struct Host {
    local_addr: SocketAddr,
    commands: UnboundedSender<HostCommand>,
    events: UnboundedReceiver<HostEvent>,
    actor: Option<JoinHandle<()>>,
}

impl Host {
    pub async fn bind(addr: SocketAddr, config: HostConfig) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let socket = UdpSocket::bind(local_addr).await?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let actor = tokio::spawn(actor::run(config, listener, socket, command_rx, event_tx));

        log::info!("Host listening on {}", local_addr);

        Ok(Self {
            local_addr,
            commands,
            events,
            actor: Some(actor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send(&self, peer_id: PeerId, payload: impl Into<Vec<u8>>) -> Result<(), NetError> {
        self.command(HostCommand::Send {
            peer_id,
            payload: payload.into(),
        })
    }

    pub fn send_unreliable(
        &self,
        peer_id: PeerId,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), NetError> {
        self.command(HostCommand::SendUnreliable {
            peer_id,
            payload: payload.into(),
        })
    }

    pub fn kick(&self, peer_id: PeerId) -> Result<(), NetError> {
        self.command(HostCommand::Kick { peer_id })
    }

    pub fn try_next_event(&mut self) -> Option<HostEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<HostEvent> {
        self.events.recv().await
    }

    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Closes every peer stream and waits for the host task to finish.
    pub async fn shutdown(&mut self) {
        let Some(actor) = self.actor.take() else {
            return;
        };

        let _ = self.commands.send(HostCommand::Shutdown);
        if let Err(e) = actor.await {
            log::error!("Host task failed: {}", e);
        }
        log::info!("Host on {} shut down", self.local_addr);
    }

    fn command(&self, command: HostCommand) -> Result<(), NetError> {
        self.commands
            .send(command)
            .map_err(|_| NetError::HostClosed)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{
        Handshake, StreamEndpoint, StreamInput, StreamMessage, connect, encode_datagram,
    };
    use crate::session::Channel;
    use std::time::Duration;

    async fn next(host: &mut Host) -> HostEvent {
        tokio::time::timeout(Duration::from_secs(2), host.next_event())
            .await
            .expect("timed out waiting for host event")
            .expect("host event stream ended")
    }

    #[tokio::test]
    async fn test_assigns_ids_and_answers_time_sync() {
        let mut host = Host::bind("127.0.0.1:0".parse().unwrap(), HostConfig::default())
            .await
            .unwrap();

        let mut stream = connect(&[host.local_addr()]).await.unwrap();
        let peer_id = Handshake::new().run(&mut stream).await.unwrap();
        assert_eq!(peer_id, PeerId(1));
        assert!(matches!(
            next(&mut host).await,
            HostEvent::PeerConnected {
                peer_id: PeerId(1),
                ..
            }
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = StreamEndpoint::start(stream, 1024, tx, |i| i).unwrap();
        endpoint
            .send(&StreamMessage::TimesyncRequest { client_time_ms: 42 })
            .unwrap();

        match rx.recv().await {
            Some(StreamInput::Message(StreamMessage::TimesyncResponse {
                client_time_ms, ..
            })) => assert_eq!(client_time_ms, 42),
            other => panic!("unexpected input: {:?}", other),
        }
        assert_eq!(
            next(&mut host).await,
            HostEvent::ClockSyncRequested { peer_id }
        );

        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_routes_datagrams_after_bind() {
        let mut host = Host::bind("127.0.0.1:0".parse().unwrap(), HostConfig::default())
            .await
            .unwrap();

        let mut stream = connect(&[host.local_addr()]).await.unwrap();
        let peer_id = Handshake::new().run(&mut stream).await.unwrap();
        next(&mut host).await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(host.local_addr()).await.unwrap();

        // unbound senders are ignored
        socket
            .send(&encode_datagram(0, b"early", 1200).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let endpoint = StreamEndpoint::start(stream, 1024, tx, |i| i).unwrap();
        endpoint
            .send(&StreamMessage::BindDatagram {
                port: socket.local_addr().unwrap().port(),
            })
            .unwrap();
        assert!(matches!(next(&mut host).await, HostEvent::DatagramBound { .. }));

        for seq in [2u32, 1, 3] {
            socket
                .send(&encode_datagram(seq, &[seq as u8], 1200).unwrap())
                .await
                .unwrap();
        }

        assert_eq!(
            next(&mut host).await,
            HostEvent::DataReceived {
                peer_id,
                channel: Channel::Unreliable,
                payload: vec![2],
            }
        );
        assert_eq!(
            next(&mut host).await,
            HostEvent::DataReceived {
                peer_id,
                channel: Channel::Unreliable,
                payload: vec![3],
            }
        );

        host.send_unreliable(peer_id, b"pong".to_vec()).unwrap();
        let mut buf = [0u8; 64];
        let size = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..size], &[0, 0, 0, 0, b'p', b'o', b'n', b'g']);

        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_kick_and_full_host() {
        let config = HostConfig {
            max_peers: 1,
            ..Default::default()
        };
        let mut host = Host::bind("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();

        let mut first = connect(&[host.local_addr()]).await.unwrap();
        let peer_id = Handshake::new().run(&mut first).await.unwrap();
        next(&mut host).await;

        let _second = connect(&[host.local_addr()]).await.unwrap();
        assert!(matches!(next(&mut host).await, HostEvent::ConnectionDenied { .. }));

        host.kick(peer_id).unwrap();
        assert_eq!(
            next(&mut host).await,
            HostEvent::PeerDisconnected {
                peer_id,
                reason: LeaveReason::Kicked,
            }
        );

        host.shutdown().await;
        assert!(host.kick(peer_id).is_err());
    }

    #[tokio::test]
    async fn test_drops_oversized_datagrams() {
        let config = HostConfig {
            max_datagram_size: 16,
            ..Default::default()
        };
        let mut host = Host::bind("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();

        let mut stream = connect(&[host.local_addr()]).await.unwrap();
        let peer_id = Handshake::new().run(&mut stream).await.unwrap();
        next(&mut host).await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(host.local_addr()).await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let endpoint = StreamEndpoint::start(stream, 1024, tx, |i| i).unwrap();
        endpoint
            .send(&StreamMessage::BindDatagram {
                port: socket.local_addr().unwrap().port(),
            })
            .unwrap();
        assert!(matches!(next(&mut host).await, HostEvent::DatagramBound { .. }));

        socket
            .send(&encode_datagram(1, &[9u8; 40], 1200).unwrap())
            .await
            .unwrap();
        socket
            .send(&encode_datagram(2, b"fits", 16).unwrap())
            .await
            .unwrap();

        assert_eq!(
            next(&mut host).await,
            HostEvent::DataReceived {
                peer_id,
                channel: Channel::Unreliable,
                payload: b"fits".to_vec(),
            }
        );

        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_peer_streams() {
        let mut host = Host::bind("127.0.0.1:0".parse().unwrap(), HostConfig::default())
            .await
            .unwrap();

        let mut stream = connect(&[host.local_addr()]).await.unwrap();
        Handshake::new().run(&mut stream).await.unwrap();
        next(&mut host).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _endpoint = StreamEndpoint::start(stream, 1024, tx, |i| i).unwrap();

        host.shutdown().await;
        let input = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(matches!(
            input,
            Some(StreamInput::Failed(NetError::RemoteClosed))
        ));
    }
}
