use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};

use crate::event::EventBus;
use crate::net::{DATAGRAM_HEADER_SIZE, NetError, ProtocolError};

use super::config::ClientConfig;
use super::events::{ClientEvent, Command, Endpoint};
use super::reactor;
use super::state::SessionState;

// A resolver lookup stuck in the blocking pool must not stall shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Handle to the client session. All network work happens on a dedicated
/// reactor thread; this handle only posts commands and never blocks on I/O,
/// with the exception of [`Client::disconnect`] and [`Client::shutdown`].
///
/// Events are delivered to every receiver obtained from [`Client::subscribe`].
pub struct Client {
    config: ClientConfig,
    commands: UnboundedSender<Command>,
    bus: EventBus<ClientEvent>,
    state: watch::Receiver<SessionState>,
    reactor: Option<thread::JoinHandle<()>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, NetError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let bus = EventBus::new();

        let reactor_bus = bus.clone();
        let reactor_config = config.clone();
        let reactor = thread::Builder::new()
            .name("tether-reactor".to_string())
            .spawn(move || {
                runtime.block_on(reactor::run(reactor_config, reactor_bus, state_tx, command_rx));
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            })?;

        log::debug!("Client reactor started");

        Ok(Self {
            config,
            commands,
            bus,
            state,
            reactor: Some(reactor),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ClientEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Starts a session. Ignored (with a warning) unless the client is idle;
    /// the outcome arrives as `Connected` or `Disconnected`.
    pub fn connect(&self, host: impl Into<String>, port: impl Into<String>) -> Result<(), NetError> {
        self.connect_to(Endpoint::new(host, port))
    }

    pub fn connect_to(&self, endpoint: Endpoint) -> Result<(), NetError> {
        self.command(Command::Connect(endpoint))
    }

    /// Tears the current session down and waits until the reactor has done
    /// so. Must not be called from inside an async runtime.
    pub fn disconnect(&self) -> Result<(), NetError> {
        let (done, finished) = oneshot::channel();
        self.command(Command::Disconnect { done })?;
        finished.blocking_recv().map_err(|_| NetError::ClientClosed)
    }

    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), NetError> {
        self.command(Command::Send(payload.into()))
    }

    pub fn send_unreliable(&self, payload: impl Into<Vec<u8>>) -> Result<(), NetError> {
        let payload = payload.into();
        let size = DATAGRAM_HEADER_SIZE + payload.len();
        if size > self.config.max_datagram_size {
            return Err(ProtocolError::DatagramTooLarge {
                size,
                max: self.config.max_datagram_size,
            }
            .into());
        }
        self.command(Command::SendUnreliable(payload))
    }

    pub fn is_shut_down(&self) -> bool {
        self.reactor.is_none()
    }

    /// Stops the reactor and joins its thread. No event is delivered after
    /// this returns; subscriber channels are closed.
    pub fn shutdown(&mut self) {
        let Some(reactor) = self.reactor.take() else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown);
        if reactor.join().is_err() {
            log::error!("Client reactor thread panicked");
        }
        self.bus.close();
        log::debug!("Client shut down");
    }

    fn command(&self, command: Command) -> Result<(), NetError> {
        if self.reactor.is_none() {
            return Err(NetError::ClientClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| NetError::ClientClosed)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert!(client.state().is_idle());
        assert!(!client.is_shut_down());
    }

    #[test]
    fn test_disconnect_without_session_is_silent() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let mut events = client.subscribe();

        client.disconnect().unwrap();
        client.disconnect().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_oversized_datagram_rejected_by_caller() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let err = client.send_unreliable(vec![0u8; 2000]).unwrap_err();
        assert!(matches!(
            err,
            NetError::Protocol(ProtocolError::DatagramTooLarge { size: 2004, .. })
        ));
    }

    #[test]
    fn test_commands_after_shutdown_fail() {
        let mut client = Client::new(ClientConfig::default()).unwrap();
        let mut events = client.subscribe();

        client.shutdown();
        client.shutdown();
        assert!(client.is_shut_down());
        assert!(matches!(
            client.connect("127.0.0.1", "1"),
            Err(NetError::ClientClosed)
        ));
        assert!(matches!(client.disconnect(), Err(NetError::ClientClosed)));
        assert!(events.try_recv().is_err());
        assert!(client.subscribe().try_recv().is_err());
    }
}
