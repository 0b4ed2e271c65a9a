use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::error::NetError;
use super::protocol::{ProtocolError, decode_datagram, encode_datagram};
use super::stats::ChannelStats;
use super::tracking::{AdmissionPolicy, SequenceTable};

#[derive(Debug)]
pub enum DatagramInput {
    Received { from: SocketAddr, datagram: Vec<u8> },
    Failed(NetError),
}

/// Datagram transport bound to exactly one remote address. Outgoing
/// datagrams carry a local sequence number; inbound ones pass per-sender
/// sequence admission before their payload is released.
#[derive(Debug)]
pub struct UnreliableChannel {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    max_datagram_size: usize,
    next_sequence: u32,
    trackers: SequenceTable<SocketAddr>,
    stats: ChannelStats,
    reader: Option<JoinHandle<()>>,
}

impl UnreliableChannel {
    pub async fn bind(
        remote_addr: SocketAddr,
        max_datagram_size: usize,
        policy: AdmissionPolicy,
    ) -> io::Result<Self> {
        let local: SocketAddr = if remote_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote_addr).await?;
        let local_addr = socket.local_addr()?;

        log::debug!("Unreliable channel {} -> {}", local_addr, remote_addr);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            remote_addr,
            max_datagram_size,
            next_sequence: 0,
            trackers: SequenceTable::new(policy),
            stats: ChannelStats::default(),
            reader: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn is_reading(&self) -> bool {
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    pub fn start_reading<M, F>(&mut self, sink: UnboundedSender<M>, wrap: F)
    where
        M: Send + 'static,
        F: Fn(DatagramInput) -> M + Send + 'static,
    {
        if self.reader.is_some() {
            return;
        }

        let socket = Arc::clone(&self.socket);
        let remote_addr = self.remote_addr;
        // one spare byte so an oversized datagram is seen rather than truncated
        let mut buffer = vec![0u8; self.max_datagram_size + 1];

        self.reader = Some(tokio::spawn(async move {
            loop {
                let input = match socket.recv(&mut buffer).await {
                    Ok(size) => DatagramInput::Received {
                        from: remote_addr,
                        datagram: buffer[..size].to_vec(),
                    },
                    Err(e) => DatagramInput::Failed(e.into()),
                };

                let failed = matches!(input, DatagramInput::Failed(_));
                if sink.send(wrap(input)).is_err() || failed {
                    break;
                }
            }
        }));
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        let datagram = encode_datagram(self.next_sequence, payload, self.max_datagram_size)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let bytes = self.socket.send(&datagram).await?;
        self.stats.record_sent(bytes);
        Ok(())
    }

    /// Parses the header and applies sequence admission. `Ok(None)` means the
    /// datagram was stale or a duplicate and has been dropped.
    pub fn admit<'a>(
        &mut self,
        from: SocketAddr,
        datagram: &'a [u8],
    ) -> Result<Option<&'a [u8]>, ProtocolError> {
        let (header, payload) = decode_datagram(datagram, self.max_datagram_size)?;
        let accepted = self.trackers.admit(from, header.sequence);
        self.stats.record_received(datagram.len(), accepted);

        if !accepted {
            log::trace!(
                "Dropping stale datagram {} from {} (last accepted {:?})",
                header.sequence,
                from,
                self.trackers.last_accepted(&from)
            );
            return Ok(None);
        }

        Ok(Some(payload))
    }

    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if !self.trackers.is_empty() || self.stats.datagrams_sent > 0 {
            log::debug!(
                "Closed unreliable channel to {}: {:?} ({:.1}% stale)",
                self.remote_addr,
                self.stats,
                self.stats.stale_percent()
            );
        }
        self.trackers.clear();
    }
}

impl Drop for UnreliableChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::MAX_DATAGRAM_SIZE;
    use tokio::sync::mpsc;

    async fn peer_pair() -> (UdpSocket, UnreliableChannel) {
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = UnreliableChannel::bind(
            remote.local_addr().unwrap(),
            MAX_DATAGRAM_SIZE,
            AdmissionPolicy::Strict,
        )
        .await
        .unwrap();
        (remote, channel)
    }

    #[tokio::test]
    async fn test_send_prefixes_sequence() {
        let (remote, mut channel) = peer_pair().await;

        channel.send(b"a").await.unwrap();
        channel.send(b"b").await.unwrap();

        let mut buf = [0u8; 64];
        let (size, from) = remote.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, channel.local_addr());
        assert_eq!(&buf[..size], &[0, 0, 0, 0, b'a']);

        let (size, _) = remote.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..size], &[0, 0, 0, 1, b'b']);
        assert_eq!(channel.stats().datagrams_sent, 2);
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_payload() {
        let (_remote, mut channel) = peer_pair().await;
        let payload = vec![0u8; MAX_DATAGRAM_SIZE];

        let err = channel.send(&payload).await.unwrap_err();
        assert!(matches!(
            err,
            NetError::Protocol(ProtocolError::DatagramTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_admission_sequence() {
        let (remote, mut channel) = peer_pair().await;
        let from = remote.local_addr().unwrap();

        let mut forwarded = Vec::new();
        for seq in [5u32, 3, 6, 6, 4, 7] {
            let datagram = encode_datagram(seq, &[seq as u8], MAX_DATAGRAM_SIZE).unwrap();
            if let Some(payload) = channel.admit(from, &datagram).unwrap() {
                forwarded.push(payload[0]);
            }
        }

        assert_eq!(forwarded, vec![5, 6, 7]);
        assert_eq!(channel.stats().datagrams_stale, 3);
        assert!(channel.admit(from, &[0, 1]).is_err());
    }

    #[tokio::test]
    async fn test_reader_keeps_oversized_datagram_whole() {
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut channel =
            UnreliableChannel::bind(remote.local_addr().unwrap(), 16, AdmissionPolicy::Strict)
                .await
                .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.start_reading(tx, |input| input);

        let datagram = encode_datagram(1, &[7u8; 40], MAX_DATAGRAM_SIZE).unwrap();
        remote.send_to(&datagram, channel.local_addr()).await.unwrap();

        let (from, datagram) = match rx.recv().await {
            Some(DatagramInput::Received { from, datagram }) => (from, datagram),
            other => panic!("unexpected input: {:?}", other),
        };
        assert_eq!(datagram.len(), 17);
        assert!(matches!(
            channel.admit(from, &datagram),
            Err(ProtocolError::DatagramTooLarge { size: 17, max: 16 })
        ));
        assert_eq!(channel.stats().datagrams_received, 0);
    }

    #[tokio::test]
    async fn test_reader_delivers_datagrams() {
        let (remote, mut channel) = peer_pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.start_reading(tx, |input| input);
        assert!(channel.is_reading());

        let datagram = encode_datagram(1, b"ping", MAX_DATAGRAM_SIZE).unwrap();
        remote.send_to(&datagram, channel.local_addr()).await.unwrap();

        match rx.recv().await {
            Some(DatagramInput::Received { from, datagram }) => {
                assert_eq!(from, remote.local_addr().unwrap());
                assert_eq!(&datagram[4..], b"ping");
            }
            other => panic!("unexpected input: {:?}", other),
        }

        channel.close();
        assert!(!channel.is_reading());
    }
}
