use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::error::NetError;
use super::protocol::{FRAME_HEADER_SIZE, StreamMessage, decode_frame, encode_frame, frame_length};

#[derive(Debug)]
pub enum StreamInput {
    Message(StreamMessage),
    Failed(NetError),
}

pub async fn resolve(host: &str, port: &str) -> Result<Vec<SocketAddr>, NetError> {
    let target = format!("{}:{}", host, port);
    // numeric ports only; tokio's resolver does not look up service names
    let port: u16 = port.parse().map_err(|_| NetError::ResolutionFailure {
        target: target.clone(),
        reason: format!("invalid port {:?}", port),
    })?;

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| NetError::ResolutionFailure {
            target: target.clone(),
            reason: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(NetError::ResolutionFailure {
            target,
            reason: "no addresses".to_string(),
        });
    }

    log::debug!("Resolved {} to {:?}", target, addrs);
    Ok(addrs)
}

/// Tries each candidate in order and returns the first stream that connects.
pub async fn connect(candidates: &[SocketAddr]) -> Result<TcpStream, NetError> {
    let mut last_error = io::Error::new(io::ErrorKind::AddrNotAvailable, "no candidates");
    let mut last_target = String::from("<none>");

    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                log::debug!("Connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("Connect to {} failed: {}", addr, e);
                last_target = addr.to_string();
                last_error = e;
            }
        }
    }

    Err(NetError::ConnectFailure {
        target: last_target,
        source: last_error,
    })
}

/// Reliable, ordered stream of length-prefixed frames. Reads are delivered
/// to the owner's channel; writes are queued and completed in the background.
#[derive(Debug)]
pub struct StreamEndpoint {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    max_frame_size: usize,
    outgoing: Option<UnboundedSender<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl StreamEndpoint {
    pub fn start<M, F>(
        stream: TcpStream,
        max_frame_size: usize,
        sink: UnboundedSender<M>,
        wrap: F,
    ) -> io::Result<Self>
    where
        M: Send + 'static,
        F: Fn(StreamInput) -> M + Clone + Send + 'static,
    {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (outgoing, queued) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_frames(
            read_half,
            max_frame_size,
            sink.clone(),
            wrap.clone(),
        ));
        let writer = tokio::spawn(write_frames(write_half, queued, sink, wrap));

        Ok(Self {
            local_addr,
            remote_addr,
            max_frame_size,
            outgoing: Some(outgoing),
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_open(&self) -> bool {
        match (&self.outgoing, &self.writer) {
            (Some(outgoing), Some(writer)) => !outgoing.is_closed() && !writer.is_finished(),
            _ => false,
        }
    }

    /// Queues a frame for writing. Completion is not reported back; a failed
    /// write surfaces as `StreamInput::Failed` on the owner's channel.
    pub fn send(&self, message: &StreamMessage) -> Result<(), NetError> {
        let frame = encode_frame(message, self.max_frame_size)?;
        let outgoing = self.outgoing.as_ref().ok_or(NetError::RemoteClosed)?;
        outgoing.send(frame).map_err(|_| NetError::RemoteClosed)
    }

    pub fn close(&mut self) {
        self.outgoing = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
            log::debug!("Closed stream {} -> {}", self.local_addr, self.remote_addr);
        }
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_frames<M, F>(
    mut read_half: OwnedReadHalf,
    max_frame_size: usize,
    sink: UnboundedSender<M>,
    wrap: F,
) where
    F: Fn(StreamInput) -> M,
{
    loop {
        let message = match read_frame(&mut read_half, max_frame_size).await {
            Ok(message) => message,
            Err(e) => {
                let _ = sink.send(wrap(StreamInput::Failed(e)));
                break;
            }
        };

        if sink.send(wrap(StreamInput::Message(message))).is_err() {
            break;
        }
    }
}

async fn read_frame(
    read_half: &mut OwnedReadHalf,
    max_frame_size: usize,
) -> Result<StreamMessage, NetError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    read_half
        .read_exact(&mut header)
        .await
        .map_err(hang_up_or_io)?;

    let len = frame_length(header, max_frame_size)?;
    let mut body = vec![0u8; len];
    read_half.read_exact(&mut body).await.map_err(hang_up_or_io)?;

    Ok(decode_frame(&body)?)
}

/// A peer that closes with our bytes still unread answers with a reset
/// rather than a clean EOF; both mean the remote side hung up.
fn hang_up_or_io(e: io::Error) -> NetError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => NetError::RemoteClosed,
        _ => NetError::Io(e),
    }
}

async fn write_frames<M, F>(
    mut write_half: OwnedWriteHalf,
    mut queued: UnboundedReceiver<Vec<u8>>,
    sink: UnboundedSender<M>,
    wrap: F,
) where
    F: Fn(StreamInput) -> M,
{
    while let Some(frame) = queued.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            let error = match e.kind() {
                io::ErrorKind::BrokenPipe => NetError::RemoteClosed,
                _ => hang_up_or_io(e),
            };
            let _ = sink.send(wrap(StreamInput::Failed(error)));
            return;
        }
    }
    let _ = write_half.shutdown().await;
}
