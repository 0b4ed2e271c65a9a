use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::event::EventBus;
use crate::net::{
    ClockSample, DatagramInput, Handshake, NetError, PeerId, StopWatch, StreamEndpoint,
    StreamInput, StreamMessage, TimeSyncLoop, UnreliableChannel, connect, resolve,
};

use super::config::ClientConfig;
use super::events::{Channel, ClientEvent, Command, DisconnectReason, Endpoint};
use super::state::SessionState;

/// Everything that completes asynchronously for a session is posted back to
/// the reactor tagged with the session token; messages for an older token
/// are dropped on arrival.
#[derive(Debug)]
enum Inbox {
    Stage {
        token: u64,
        state: SessionState,
    },
    Established {
        token: u64,
        stream: TcpStream,
        peer_id: PeerId,
    },
    Failed {
        token: u64,
        error: NetError,
    },
    Stream {
        token: u64,
        input: StreamInput,
    },
    Datagram {
        token: u64,
        input: DatagramInput,
    },
    SyncDue {
        token: u64,
    },
}

impl Inbox {
    fn token(&self) -> u64 {
        match self {
            Inbox::Stage { token, .. }
            | Inbox::Established { token, .. }
            | Inbox::Failed { token, .. }
            | Inbox::Stream { token, .. }
            | Inbox::Datagram { token, .. }
            | Inbox::SyncDue { token } => *token,
        }
    }
}

#[derive(Debug)]
struct Session {
    token: u64,
    endpoint: Endpoint,
    peer_id: Option<PeerId>,
    establishing: Option<JoinHandle<()>>,
    stream: Option<StreamEndpoint>,
    channel: Option<UnreliableChannel>,
    time_sync: TimeSyncLoop,
}

struct Reactor {
    config: ClientConfig,
    bus: EventBus<ClientEvent>,
    state: watch::Sender<SessionState>,
    clock: StopWatch,
    session: Option<Session>,
    next_token: u64,
    inbox: UnboundedSender<Inbox>,
}

/// Session controller. Sole owner of every socket, task and timer of the
/// client; runs until `Shutdown` or until the command channel closes.
pub(crate) async fn run(
    config: ClientConfig,
    bus: EventBus<ClientEvent>,
    state: watch::Sender<SessionState>,
    mut commands: UnboundedReceiver<Command>,
) {
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let mut reactor = Reactor {
        config,
        bus,
        state,
        clock: StopWatch::start(),
        session: None,
        next_token: 1,
        inbox: inbox_tx,
    };

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else { break };
                let stopping = matches!(command, Command::Shutdown);
                reactor.handle_command(command).await;
                if stopping {
                    break;
                }
            }
            Some(input) = inbox.recv() => reactor.handle_inbox(input).await,
        }
    }

    // no-op after an explicit Shutdown; covers a dropped command channel
    reactor.teardown(DisconnectReason::Shutdown);
    reactor.bus.close();
    log::debug!("Reactor stopped");
}

impl Reactor {
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(endpoint) => self.connect(endpoint),
            Command::Disconnect { done } => {
                self.teardown(DisconnectReason::Requested);
                let _ = done.send(());
            }
            Command::Shutdown => self.teardown(DisconnectReason::Shutdown),
            Command::Send(payload) => self.send_reliable(payload),
            Command::SendUnreliable(payload) => self.send_unreliable(payload).await,
        }
    }

    async fn handle_inbox(&mut self, input: Inbox) {
        let current = self.session.as_ref().map(|session| session.token);
        if current != Some(input.token()) {
            log::trace!("Discarding message for finished session {}", input.token());
            return;
        }

        match input {
            Inbox::Stage { state, .. } => self.set_state(state),
            Inbox::Established {
                stream, peer_id, ..
            } => {
                if let Err(error) = self.activate(stream, peer_id).await {
                    self.fail(error);
                }
            }
            Inbox::Failed { error, .. } => self.fail(error),
            Inbox::Stream { input, .. } => self.handle_stream(input),
            Inbox::Datagram { input, .. } => self.handle_datagram(input),
            Inbox::SyncDue { .. } => self.request_time_sync(),
        }
    }

    fn connect(&mut self, endpoint: Endpoint) {
        if let Some(session) = &self.session {
            log::warn!(
                "Ignoring connect to {}: session with {} is {}",
                endpoint,
                session.endpoint,
                self.current_state()
            );
            return;
        }

        let token = self.next_token;
        self.next_token += 1;

        log::info!("Connecting to {}", endpoint);
        self.set_state(SessionState::Resolving);

        let establishing = tokio::spawn(establish(
            endpoint.clone(),
            self.config.clone(),
            self.inbox.clone(),
            token,
        ));

        self.session = Some(Session {
            token,
            endpoint,
            peer_id: None,
            establishing: Some(establishing),
            stream: None,
            channel: None,
            time_sync: TimeSyncLoop::new(self.config.time_sync_interval),
        });
    }

    /// Runs once the handshake is `Established`: the unreliable channel is
    /// only ever created here.
    async fn activate(&mut self, stream: TcpStream, peer_id: PeerId) -> Result<(), NetError> {
        let token = match &self.session {
            Some(session) => session.token,
            None => return Ok(()),
        };

        let remote_addr = stream.peer_addr()?;
        let mut channel = UnreliableChannel::bind(
            remote_addr,
            self.config.max_datagram_size,
            self.config.admission,
        )
        .await?;

        let stream = StreamEndpoint::start(
            stream,
            self.config.max_frame_size,
            self.inbox.clone(),
            move |input| Inbox::Stream { token, input },
        )?;
        stream.send(&StreamMessage::BindDatagram {
            port: channel.local_addr().port(),
        })?;
        channel.start_reading(self.inbox.clone(), move |input| Inbox::Datagram {
            token,
            input,
        });

        let endpoint = match self.session.as_mut() {
            Some(session) => {
                session.establishing = None;
                session.peer_id = Some(peer_id);
                session.stream = Some(stream);
                session.channel = Some(channel);
                session.endpoint.clone()
            }
            None => return Ok(()),
        };

        self.set_state(SessionState::Connected);
        log::info!("Connected to {} ({}) as peer {}", endpoint, remote_addr, peer_id);
        self.bus.publish(ClientEvent::Connected { peer_id });

        self.request_time_sync();
        Ok(())
    }

    fn handle_stream(&mut self, input: StreamInput) {
        let Some(peer_id) = self.session.as_ref().and_then(|session| session.peer_id) else {
            return;
        };

        match input {
            StreamInput::Message(StreamMessage::Data(payload)) => {
                self.bus.publish(ClientEvent::DataReceived {
                    peer_id,
                    channel: Channel::Reliable,
                    payload,
                });
            }
            StreamInput::Message(StreamMessage::TimesyncResponse {
                client_time_ms,
                server_time_ms,
            }) => {
                let sample = ClockSample {
                    sent_ms: client_time_ms,
                    remote_ms: server_time_ms,
                    received_ms: self.clock.elapsed_ms(),
                };
                log::trace!("Time sync round trip {} ms", sample.round_trip_ms());
                self.bus.publish(ClientEvent::ClockSample { peer_id, sample });
            }
            StreamInput::Message(other) => {
                log::warn!("Ignoring unexpected stream message {:?}", other);
            }
            StreamInput::Failed(error) => self.fail(error),
        }
    }

    fn handle_datagram(&mut self, input: DatagramInput) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let (Some(peer_id), Some(channel)) = (session.peer_id, session.channel.as_mut()) else {
            return;
        };

        match input {
            DatagramInput::Received { from, datagram } => match channel.admit(from, &datagram) {
                Ok(Some(payload)) => {
                    self.bus.publish(ClientEvent::DataReceived {
                        peer_id,
                        channel: Channel::Unreliable,
                        payload: payload.to_vec(),
                    });
                }
                Ok(None) => {}
                Err(error) => self.fail(error.into()),
            },
            DatagramInput::Failed(error) => self.fail(error),
        }
    }

    /// Sends a sync request and re-arms the one-shot timer, unless the
    /// reliable channel has closed in the meantime.
    fn request_time_sync(&mut self) {
        let client_time_ms = self.clock.elapsed_ms();
        let inbox = self.inbox.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match &session.stream {
            Some(stream) if stream.is_open() => {
                if let Err(error) = stream.send(&StreamMessage::TimesyncRequest { client_time_ms }) {
                    log::warn!("Time sync request failed: {}", error);
                    return;
                }
            }
            _ => {
                log::debug!("Reliable channel closed, time sync loop ends");
                return;
            }
        }

        let token = session.token;
        session.time_sync.arm(inbox, Inbox::SyncDue { token });
    }

    fn send_reliable(&mut self, payload: Vec<u8>) {
        let Some(stream) = self.session.as_ref().and_then(|session| session.stream.as_ref()) else {
            log::warn!("Dropping {} byte reliable payload: not connected", payload.len());
            return;
        };

        if let Err(error) = stream.send(&StreamMessage::Data(payload)) {
            log::warn!("Dropping reliable payload: {}", error);
        }
    }

    async fn send_unreliable(&mut self, payload: Vec<u8>) {
        let Some(channel) = self.session.as_mut().and_then(|session| session.channel.as_mut())
        else {
            log::warn!("Dropping {} byte datagram: not connected", payload.len());
            return;
        };

        let result = channel.send(&payload).await;
        match result {
            Ok(()) => {}
            Err(NetError::Protocol(error)) => log::warn!("Dropping datagram: {}", error),
            Err(error) => self.fail(error),
        }
    }

    fn fail(&mut self, error: NetError) {
        match &self.session {
            Some(session) => log::warn!("Session with {} failed: {}", session.endpoint, error),
            None => log::warn!("Session failed: {}", error),
        }
        self.teardown(DisconnectReason::Failed(error.kind()));
    }

    /// Cancels the timer and any in-flight resolve/connect/handshake before
    /// the sockets are closed. A no-op when no session exists, so repeated
    /// disconnects emit a single `Disconnected`.
    fn teardown(&mut self, reason: DisconnectReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        self.set_state(SessionState::Disconnecting);

        session.time_sync.stop();
        if let Some(establishing) = session.establishing.take() {
            establishing.abort();
        }
        if let Some(mut channel) = session.channel.take() {
            channel.close();
        }
        if let Some(mut stream) = session.stream.take() {
            stream.close();
        }

        self.set_state(SessionState::Idle);
        log::info!("Session with {} {}", session.endpoint, reason.as_str());
        self.bus.publish(ClientEvent::Disconnected {
            peer_id: session.peer_id,
            reason,
        });
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::debug!("Session state {} -> {}", previous, next);
        }
    }
}

async fn establish(
    endpoint: Endpoint,
    config: ClientConfig,
    inbox: UnboundedSender<Inbox>,
    token: u64,
) {
    let result = async {
        let candidates = within(
            "resolve",
            config.connect_timeout,
            resolve(&endpoint.host, &endpoint.port),
        )
        .await?;

        let _ = inbox.send(Inbox::Stage {
            token,
            state: SessionState::Connecting,
        });
        let mut stream = within("connect", config.connect_timeout, connect(&candidates)).await?;

        let _ = inbox.send(Inbox::Stage {
            token,
            state: SessionState::Handshaking,
        });
        let mut handshake = Handshake::new();
        let peer_id = within(
            "handshake",
            config.handshake_timeout,
            handshake.run(&mut stream),
        )
        .await?;

        Ok::<_, NetError>((stream, peer_id))
    }
    .await;

    let message = match result {
        Ok((stream, peer_id)) => Inbox::Established {
            token,
            stream,
            peer_id,
        },
        Err(error) => Inbox::Failed { token, error },
    };
    let _ = inbox.send(message);
}

async fn within<T, F>(
    operation: &'static str,
    limit: Option<Duration>,
    future: F,
) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, future)
            .await
            .map_err(|_| NetError::Timeout { operation, after })?,
        None => future.await,
    }
}
