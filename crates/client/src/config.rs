use std::time::Duration;

use clap::Parser;
use tether::{AdmissionPolicy, ClientConfig, DEFAULT_PORT, MAX_DATAGRAM_SIZE};

#[derive(Parser, Debug)]
#[command(name = "tether-client")]
#[command(about = "Connects to a tether host and exchanges test traffic")]
pub struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT.to_string())]
    pub port: String,

    #[arg(long, default_value_t = 5000, help = "Time sync interval in ms (0 disables)")]
    pub sync_interval_ms: u64,

    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE)]
    pub max_datagram_size: usize,

    #[arg(long, default_value_t = 10, help = "Connect timeout in seconds (0 waits forever)")]
    pub connect_timeout_secs: u64,

    #[arg(long, help = "Accept datagram sequences across a u32 wrap")]
    pub wrapping_sequences: bool,

    #[arg(short, long, help = "Payload sent on both channels once connected")]
    pub message: Option<String>,

    #[arg(short, long, default_value_t = 10, help = "Seconds to stay connected")]
    pub duration_secs: u64,
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        let connect_timeout =
            (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs));

        ClientConfig {
            time_sync_interval: Duration::from_millis(self.sync_interval_ms),
            max_datagram_size: self.max_datagram_size,
            connect_timeout,
            handshake_timeout: connect_timeout,
            admission: if self.wrapping_sequences {
                AdmissionPolicy::Wrapping
            } else {
                AdmissionPolicy::Strict
            },
            ..Default::default()
        }
    }
}
