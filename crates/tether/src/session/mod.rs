mod client;
mod config;
mod events;
mod reactor;
mod state;

pub use client::Client;
pub use config::ClientConfig;
pub use events::{Channel, ClientEvent, DisconnectReason, Endpoint};
pub use state::SessionState;
