use crate::net::{AdmissionPolicy, MAX_DATAGRAM_SIZE, MAX_FRAME_SIZE};

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub max_peers: usize,
    pub max_datagram_size: usize,
    pub max_frame_size: usize,
    pub admission: AdmissionPolicy,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_peers: 32,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            admission: AdmissionPolicy::Strict,
        }
    }
}
