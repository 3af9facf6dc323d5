//! TCP bridge to a module behind a serial-over-TCP adapter.
//!
//! The bridge owns a tokio runtime running two tasks per connection:
//!
//! - reader: reads socket bytes and feeds the `HciReceiver`, sweeping expired
//!   commands on a timer;
//! - writer: drains encoded frames queued by the `HciClient` and writes them
//!   to the socket.
//!
//! Commands are issued from ordinary threads through the returned
//! `HciClient` and block outside the runtime.

use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wimod_hci::{connect, HciClient, HciConfig, HciReceiver, Transport};

use crate::config::ConnectionConfig;
use crate::error::CliResult;

const READ_BUFFER_SIZE: usize = 1024;

/// Transport that queues frames for the async writer task.
#[derive(Debug, Clone)]
pub struct QueueTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Transport for QueueTransport {
    fn send_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task stopped"))
    }
}

/// A live connection.
pub struct TcpBridge {
    runtime: Runtime,
    client: HciClient,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TcpBridge {
    /// Connect to `connection.address` and start the pipeline.
    pub fn connect(connection: &ConnectionConfig, hci: HciConfig) -> CliResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("wimod-bridge")
            .enable_all()
            .build()?;

        let stream = runtime.block_on(TcpStream::connect(&connection.address))?;
        stream.set_nodelay(true)?;
        info!(address = %connection.address, "connected");
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel();
        let (client, receiver) = connect(hci, QueueTransport { tx })?;

        let sweep = Duration::from_millis(connection.sweep_interval_ms.max(1));
        let reader = runtime.spawn(run_reader(read_half, receiver, sweep));
        let writer = runtime.spawn(run_writer(write_half, rx, client.clone()));

        Ok(TcpBridge {
            runtime,
            client,
            reader,
            writer,
        })
    }

    /// Command-side handle.
    pub fn client(&self) -> &HciClient {
        &self.client
    }

    /// Close the core and stop both tasks.
    pub fn shutdown(self) {
        self.client.shutdown();
        self.reader.abort();
        self.writer.abort();
        self.runtime.shutdown_timeout(Duration::from_millis(200));
        debug!("bridge stopped");
    }
}

async fn run_reader(mut socket: OwnedReadHalf, mut receiver: HciReceiver, sweep: Duration) {
    let client = receiver.client();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut tick = tokio::time::interval(sweep);

    loop {
        tokio::select! {
            result = socket.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        info!("connection closed by peer");
                        break;
                    }
                    Ok(n) => {
                        if receiver.feed(&buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
            _ = tick.tick() => {
                client.sweep_expired(Instant::now());
            }
        }
    }
    receiver.close();
}

async fn run_writer(
    mut socket: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    client: HciClient,
) {
    while let Some(frame) = frames.recv().await {
        let result = async {
            socket.write_all(&frame).await?;
            socket.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "socket write failed");
            client.shutdown();
            return;
        }
    }
}
