use std::time::Duration;

use crate::net::{AdmissionPolicy, MAX_DATAGRAM_SIZE, MAX_FRAME_SIZE};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub time_sync_interval: Duration,
    pub max_datagram_size: usize,
    pub max_frame_size: usize,
    pub connect_timeout: Option<Duration>,
    pub handshake_timeout: Option<Duration>,
    pub admission: AdmissionPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            time_sync_interval: Duration::from_secs(5),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            connect_timeout: Some(Duration::from_secs(10)),
            handshake_timeout: Some(Duration::from_secs(10)),
            admission: AdmissionPolicy::Strict,
        }
    }
}
