use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tether::{AdmissionPolicy, DEFAULT_PORT, HostConfig, MAX_DATAGRAM_SIZE};

#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "Tether host for exercising client sessions")]
pub struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(short, long, default_value_t = 32)]
    pub max_peers: usize,

    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE)]
    pub max_datagram_size: usize,

    #[arg(long, help = "Accept datagram sequences across a u32 wrap")]
    pub wrapping_sequences: bool,

    #[arg(long, help = "Send every payload back on the channel it arrived on")]
    pub echo: bool,
}

impl Args {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind, self.port))
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            max_peers: self.max_peers,
            max_datagram_size: self.max_datagram_size,
            admission: if self.wrapping_sequences {
                AdmissionPolicy::Wrapping
            } else {
                AdmissionPolicy::Strict
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let args = Args::parse_from(["tether-server", "--bind", "127.0.0.1", "--port", "4000"]);
        assert_eq!(
            args.bind_addr().unwrap(),
            "127.0.0.1:4000".parse::<SocketAddr>().unwrap()
        );

        let args = Args::parse_from(["tether-server", "--bind", "not an ip"]);
        assert!(args.bind_addr().is_err());
    }

    #[test]
    fn test_host_config() {
        let args = Args::parse_from(["tether-server", "--max-peers", "4", "--wrapping-sequences"]);
        let config = args.host_config();
        assert_eq!(config.max_peers, 4);
        assert_eq!(config.admission, AdmissionPolicy::Wrapping);
    }
}
