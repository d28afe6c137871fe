//! Dispatch loop
//!
//! One task owns the datagram source. Every datagram is copied out of the
//! receive buffer and handed to its own task, so a slow forward never holds
//! up the next receive.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::pipeline::{PacketOutcome, Pipeline};

/// Byte count and sender of one datagram, `None` once the source is exhausted
pub type Received = Option<(usize, Option<SocketAddr>)>;

/// Where datagrams come from
#[async_trait]
pub trait DatagramSource: Send {
    /// Receive the next datagram into `buf`
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Received>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        let (len, peer) = self.recv_from(buf).await?;
        Ok(Some((len, Some(peer))))
    }
}

/// In-process datagram source fed through a channel
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl DatagramSource for ChannelSource {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        match self.rx.recv().await {
            Some(datagram) => {
                // Oversized datagrams are truncated like a short UDP buffer would
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some((len, None)))
            }
            None => Ok(None),
        }
    }
}

/// Receive loop feeding the pipeline
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    buffer_size: usize,
    debug: bool,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>, buffer_size: usize) -> Self {
        Self {
            pipeline,
            buffer_size: buffer_size.max(1),
            debug: false,
        }
    }

    /// Log every received datagram
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Run until `shutdown` resolves or the source is exhausted
    ///
    /// On shutdown in-flight packets are abandoned. When the source runs dry
    /// the loop waits for in-flight packets before returning.
    pub async fn run<S, F>(&self, mut source: S, shutdown: F)
    where
        S: DatagramSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tasks: JoinSet<PacketOutcome> = JoinSet::new();
        let mut buf = vec![0u8; self.buffer_size];

        info!(buffer_size = self.buffer_size, "Receive loop started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(in_flight = tasks.len(), "Receive loop stopping, abandoning in-flight packets");
                    tasks.abort_all();
                    return;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(joined);
                }

                received = source.recv_datagram(&mut buf) => match received {
                    Ok(Some((len, peer))) => self.dispatch(&mut tasks, &buf[..len], peer),
                    Ok(None) => {
                        info!("Datagram source closed");
                        break;
                    }
                    Err(e) => warn!(error = %e, "Receive failed"),
                },
            }
        }

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tasks.abort_all();
                    return;
                }

                joined = tasks.join_next() => match joined {
                    Some(joined) => reap(joined),
                    None => break,
                },
            }
        }

        debug!("Receive loop drained");
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<PacketOutcome>,
        datagram: &[u8],
        peer: Option<SocketAddr>,
    ) {
        self.pipeline.metrics().received.inc();

        if self.debug {
            info!(
                peer = ?peer,
                bytes = datagram.len(),
                payload = %String::from_utf8_lossy(datagram),
                "RECV"
            );
        }

        let payload = Bytes::copy_from_slice(datagram);
        let pipeline = self.pipeline.clone();
        tasks.spawn(async move {
            let outcome = pipeline.handle_datagram(&payload, payload.len()).await;
            outcome.log(peer);
            outcome
        });
    }
}

fn reap(joined: Result<PacketOutcome, JoinError>) {
    match joined {
        Ok(_) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Packet task panicked"),
        Err(_) => {}
    }
}
