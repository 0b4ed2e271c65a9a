use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::net::{
    ChannelStats, NetError, PeerId, SequenceTable, StopWatch, StreamEndpoint, StreamInput,
    StreamMessage, decode_datagram, encode_datagram, write_record,
};
use crate::session::Channel;

use super::config::HostConfig;
use super::events::{HostCommand, HostEvent, LeaveReason};
use super::routing::RoutingTable;

#[derive(Debug)]
struct PeerInput {
    peer_id: PeerId,
    input: StreamInput,
}

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    stream: StreamEndpoint,
    next_sequence: u32,
}

struct HostState {
    config: HostConfig,
    socket: Arc<UdpSocket>,
    peers: HashMap<PeerId, Peer>,
    routes: RoutingTable,
    trackers: SequenceTable<PeerId>,
    next_peer_id: u32,
    clock: StopWatch,
    stats: ChannelStats,
    inbox: UnboundedSender<PeerInput>,
    events: UnboundedSender<HostEvent>,
}

pub(crate) async fn run(
    config: HostConfig,
    listener: TcpListener,
    socket: UdpSocket,
    mut commands: UnboundedReceiver<HostCommand>,
    events: UnboundedSender<HostEvent>,
) {
    let socket = Arc::new(socket);
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let mut buffer = vec![0u8; config.max_datagram_size + 1];

    let mut state = HostState {
        trackers: SequenceTable::new(config.admission),
        config,
        socket: Arc::clone(&socket),
        peers: HashMap::new(),
        routes: RoutingTable::new(),
        next_peer_id: 1,
        clock: StopWatch::start(),
        stats: ChannelStats::default(),
        inbox: inbox_tx,
        events,
    };

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    state.close();
                    break;
                };
                let stopping = matches!(command, HostCommand::Shutdown);
                state.handle_command(command).await;
                if stopping {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => state.accept(stream, addr).await,
                Err(e) => log::warn!("Accept failed: {}", e),
            },
            Some(input) = inbox.recv() => state.handle_stream(input),
            received = socket.recv_from(&mut buffer) => match received {
                Ok((size, from)) => state.handle_datagram(from, &buffer[..size]),
                Err(e) => log::debug!("Datagram receive failed: {}", e),
            },
        }
    }
}

impl HostState {
    async fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::Send { peer_id, payload } => self.send(peer_id, payload),
            HostCommand::SendUnreliable { peer_id, payload } => {
                self.send_unreliable(peer_id, payload).await
            }
            HostCommand::Kick { peer_id } => self.remove_peer(peer_id, LeaveReason::Kicked),
            HostCommand::Shutdown => self.close(),
        }
    }

    async fn accept(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        if self.peers.len() >= self.config.max_peers {
            log::warn!("Denying connection from {}: host full", addr);
            self.emit(HostEvent::ConnectionDenied {
                addr,
                reason: "Host full".to_string(),
            });
            return;
        }

        let peer_id = PeerId(self.next_peer_id);
        self.next_peer_id = self.next_peer_id.wrapping_add(1).max(1);

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not set nodelay for {}: {}", addr, e);
        }
        if let Err(e) = write_record(&mut stream, peer_id).await {
            log::warn!("Handshake with {} failed: {}", addr, e);
            self.emit(HostEvent::ConnectionDenied {
                addr,
                reason: e.to_string(),
            });
            return;
        }

        let stream = match StreamEndpoint::start(
            stream,
            self.config.max_frame_size,
            self.inbox.clone(),
            move |input| PeerInput { peer_id, input },
        ) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Could not start stream for {}: {}", addr, e);
                self.emit(HostEvent::ConnectionDenied {
                    addr,
                    reason: e.to_string(),
                });
                return;
            }
        };

        self.peers.insert(
            peer_id,
            Peer {
                addr,
                stream,
                next_sequence: 0,
            },
        );

        log::info!("Peer {} connected from {}", peer_id, addr);
        self.emit(HostEvent::PeerConnected { peer_id, addr });
    }

    fn handle_stream(&mut self, PeerInput { peer_id, input }: PeerInput) {
        let Some(peer) = self.peers.get(&peer_id) else {
            return;
        };

        match input {
            StreamInput::Message(StreamMessage::BindDatagram { port }) => {
                let addr = SocketAddr::new(peer.addr.ip(), port);
                self.routes.bind(peer_id, addr);
                self.trackers.remove(&peer_id);
                log::debug!("Peer {} bound datagrams to {}", peer_id, addr);
                self.emit(HostEvent::DatagramBound { peer_id, addr });
            }
            StreamInput::Message(StreamMessage::TimesyncRequest { client_time_ms }) => {
                let response = StreamMessage::TimesyncResponse {
                    client_time_ms,
                    server_time_ms: self.clock.elapsed_ms(),
                };
                if let Err(e) = peer.stream.send(&response) {
                    log::warn!("Time sync reply to peer {} failed: {}", peer_id, e);
                }
                self.emit(HostEvent::ClockSyncRequested { peer_id });
            }
            StreamInput::Message(StreamMessage::Data(payload)) => {
                self.emit(HostEvent::DataReceived {
                    peer_id,
                    channel: Channel::Reliable,
                    payload,
                });
            }
            StreamInput::Message(other) => {
                log::warn!("Ignoring unexpected message from peer {}: {:?}", peer_id, other);
            }
            StreamInput::Failed(NetError::RemoteClosed) => {
                self.remove_peer(peer_id, LeaveReason::Graceful)
            }
            StreamInput::Failed(e) => {
                log::warn!("Stream of peer {} failed: {}", peer_id, e);
                self.remove_peer(peer_id, LeaveReason::Failed(e.kind()));
            }
        }
    }

    fn handle_datagram(&mut self, from: SocketAddr, datagram: &[u8]) {
        let Some(peer_id) = self.routes.peer_for(&from) else {
            log::trace!("Dropping datagram from unbound address {}", from);
            return;
        };

        let (header, payload) = match decode_datagram(datagram, self.config.max_datagram_size) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Dropping malformed datagram from peer {}: {}", peer_id, e);
                return;
            }
        };

        let accepted = self.trackers.admit(peer_id, header.sequence);
        self.stats.record_received(datagram.len(), accepted);
        if !accepted {
            log::trace!("Dropping stale datagram {} from peer {}", header.sequence, peer_id);
            return;
        }

        self.emit(HostEvent::DataReceived {
            peer_id,
            channel: Channel::Unreliable,
            payload: payload.to_vec(),
        });
    }

    fn send(&mut self, peer_id: PeerId, payload: Vec<u8>) {
        let Some(peer) = self.peers.get(&peer_id) else {
            log::warn!("Dropping reliable payload for unknown peer {}", peer_id);
            return;
        };
        if let Err(e) = peer.stream.send(&StreamMessage::Data(payload)) {
            log::warn!("Dropping reliable payload for peer {}: {}", peer_id, e);
        }
    }

    async fn send_unreliable(&mut self, peer_id: PeerId, payload: Vec<u8>) {
        let (Some(addr), Some(peer)) = (self.routes.addr_for(peer_id), self.peers.get_mut(&peer_id))
        else {
            log::warn!("Dropping datagram for peer {}: no datagram route", peer_id);
            return;
        };

        let datagram =
            match encode_datagram(peer.next_sequence, &payload, self.config.max_datagram_size) {
                Ok(datagram) => datagram,
                Err(e) => {
                    log::warn!("Dropping datagram for peer {}: {}", peer_id, e);
                    return;
                }
            };
        peer.next_sequence = peer.next_sequence.wrapping_add(1);

        match self.socket.send_to(&datagram, addr).await {
            Ok(bytes) => self.stats.record_sent(bytes),
            Err(e) => log::warn!("Datagram to peer {} failed: {}", peer_id, e),
        }
    }

    fn remove_peer(&mut self, peer_id: PeerId, reason: LeaveReason) {
        let Some(mut peer) = self.peers.remove(&peer_id) else {
            return;
        };

        peer.stream.close();
        self.routes.remove(peer_id);
        self.trackers.remove(&peer_id);

        log::info!("Peer {} {}", peer_id, reason.as_str());
        self.emit(HostEvent::PeerDisconnected { peer_id, reason });
    }

    fn close(&mut self) {
        for (_, mut peer) in self.peers.drain() {
            peer.stream.close();
        }
        self.routes.clear();
        self.trackers.clear();
        log::debug!(
            "Host closed: {:?} ({:.1}% stale)",
            self.stats,
            self.stats.stale_percent()
        );
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }
}
