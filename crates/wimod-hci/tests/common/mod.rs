//! Simulated WiMOD module for integration tests.
//!
//! The host side is a real `HciClient`/`HciReceiver` pair. Frames the host
//! writes go through a `ChannelTransport` to a module thread that decodes
//! them, asks a responder closure what to answer, and writes the encoded
//! replies back into the receiver's byte stream.

#![allow(dead_code)]

use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use wimod_hci::{
    connect, slip, ChannelTransport, HciClient, HciCodec, HciConfig, HciError, HciMessage,
    SlipDecoder,
};

/// Poll interval of the reader; also the sweep granularity.
const READ_POLL: Duration = Duration::from_millis(5);

// ============================================================================
// Byte Stream
// ============================================================================

/// `Read` over a channel of byte chunks. Reports `TimedOut` when idle and end
/// of stream once every sender is gone.
pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        ChannelReader {
            rx,
            pending: Vec::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(READ_POLL) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

// ============================================================================
// Simulated Module
// ============================================================================

/// One reply from the module, optionally delayed.
pub struct Reply {
    pub msg: HciMessage,
    pub delay: Duration,
}

impl Reply {
    pub fn now(msg: HciMessage) -> Self {
        Reply {
            msg,
            delay: Duration::ZERO,
        }
    }

    pub fn after(delay: Duration, msg: HciMessage) -> Self {
        Reply { msg, delay }
    }
}

/// Shared write end of the module-to-host byte stream. `None` once the link
/// has been cut.
type Uplink = Arc<Mutex<Option<Sender<Vec<u8>>>>>;

pub struct SimModule {
    pub client: HciClient,
    codec: HciCodec,
    config: HciConfig,
    uplink: Uplink,
    requests: Arc<Mutex<Vec<HciMessage>>>,
    rx_thread: Option<JoinHandle<HciError>>,
}

impl SimModule {
    /// Start a module answering with `respond`. SAPs must be registered on
    /// `client` by the test.
    pub fn start<F>(config: HciConfig, respond: F) -> SimModule
    where
        F: FnMut(&HciMessage) -> Vec<Reply> + Send + 'static,
    {
        let (transport, host_frames) = ChannelTransport::unbounded();
        let (client, receiver) = connect(config.clone(), transport).expect("valid config");
        let (to_host, from_module) = crossbeam_channel::unbounded();
        let uplink: Uplink = Arc::new(Mutex::new(Some(to_host)));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let rx_thread = receiver
            .spawn(ChannelReader::new(from_module))
            .expect("spawn receiver");

        let module_uplink = uplink.clone();
        let module_requests = requests.clone();
        let module_config = config.clone();
        thread::Builder::new()
            .name("sim-module".to_string())
            .spawn(move || run_module(module_config, host_frames, module_uplink, module_requests, respond))
            .expect("spawn module");

        SimModule {
            client,
            codec: config.codec(),
            config,
            uplink,
            requests,
            rx_thread: Some(rx_thread),
        }
    }

    /// Module that never answers.
    pub fn silent(config: HciConfig) -> SimModule {
        SimModule::start(config, |_| Vec::new())
    }

    /// Encode `msg` as it would appear on the wire.
    pub fn wire_bytes(&self, msg: &HciMessage) -> Vec<u8> {
        let frame = self.codec.encode_frame(msg).expect("encodable");
        slip::encode(&frame, &self.config.markers)
    }

    /// Send a message from the module unprompted.
    pub fn indicate(&self, msg: HciMessage) {
        let bytes = self.wire_bytes(&msg);
        self.inject(bytes);
    }

    /// Write raw bytes into the host's receive stream.
    pub fn inject(&self, bytes: Vec<u8>) {
        if let Some(tx) = self.uplink.lock().as_ref() {
            let _ = tx.send(bytes);
        }
    }

    /// Requests the module has seen so far.
    pub fn requests(&self) -> Vec<HciMessage> {
        self.requests.lock().clone()
    }

    /// Cut the module-to-host stream. The receiver sees end of stream.
    pub fn disconnect(&mut self) -> HciError {
        self.uplink.lock().take();
        self.rx_thread
            .take()
            .expect("receiver running")
            .join()
            .expect("receiver thread panicked")
    }
}

fn run_module<F>(
    config: HciConfig,
    host_frames: Receiver<Vec<u8>>,
    uplink: Uplink,
    requests: Arc<Mutex<Vec<HciMessage>>>,
    mut respond: F,
) where
    F: FnMut(&HciMessage) -> Vec<Reply>,
{
    let codec = config.codec();
    let mut decoder = SlipDecoder::new(config.markers, config.max_frame_size);

    for bytes in host_frames.iter() {
        for frame in decoder.push(&bytes).into_iter().flatten() {
            let Ok(msg) = codec.decode_frame(&frame) else {
                continue;
            };
            requests.lock().push(msg.clone());

            for reply in respond(&msg) {
                let frame = codec.encode_frame(&reply.msg).expect("encodable reply");
                let wire = slip::encode(&frame, &config.markers);
                if reply.delay.is_zero() {
                    if let Some(tx) = uplink.lock().as_ref() {
                        let _ = tx.send(wire);
                    }
                } else {
                    let uplink = uplink.clone();
                    thread::spawn(move || {
                        thread::sleep(reply.delay);
                        if let Some(tx) = uplink.lock().as_ref() {
                            let _ = tx.send(wire);
                        }
                    });
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Response to `req` carrying `status` followed by `data`, with the request's
/// tag.
pub fn response(req: &HciMessage, status: u8, data: &[u8]) -> HciMessage {
    let mut payload = vec![status];
    payload.extend_from_slice(data);
    HciMessage {
        sap_id: req.sap_id,
        msg_id: req.msg_id.wrapping_add(1),
        tag: req.tag,
        payload: payload.into(),
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
