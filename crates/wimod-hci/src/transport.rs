//! Outbound half of the transport boundary.
//!
//! The core never owns a serial port. It writes encoded frames through a
//! [`Transport`] and receives bytes pushed into
//! [`HciReceiver::feed`](crate::HciReceiver::feed).

use std::io::{self, Write};

use crossbeam_channel::{Receiver, Sender};

/// Sink for encoded frames.
pub trait Transport: Send {
    /// Write one complete SLIP-encoded frame.
    fn send_frame(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Adapter for any blocking [`Write`] (serial port handle, TCP stream, pipe).
#[derive(Debug)]
pub struct IoTransport<W> {
    writer: W,
}

impl<W: Write + Send> IoTransport<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        IoTransport { writer }
    }

    /// Recover the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Transport for IoTransport<W> {
    fn send_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }
}

/// Transport that hands each encoded frame to a channel.
///
/// Used for in-process loopback and to bridge into an async writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a transport and the receiving end of its frame channel.
    pub fn unbounded() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelTransport { tx }, rx)
    }

    /// Wrap an existing sender.
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        ChannelTransport { tx }
    }
}

impl Transport for ChannelTransport {
    fn send_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame channel closed"))
    }
}
