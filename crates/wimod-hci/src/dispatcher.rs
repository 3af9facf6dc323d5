//! Dispatcher and command/response correlator.
//!
//! [`connect`] builds the two halves of one HCI core:
//!
//! - [`HciClient`]: cloneable command side. Registers SAPs, sends commands and
//!   fire-and-forget messages.
//! - [`HciReceiver`]: the single decode path. Owns the SLIP decoder and routes
//!   every decoded message to the pending command of its SAP or to the SAP's
//!   indication handler.
//!
//! Each SAP has at most one outstanding command. A second command to the same
//! SAP is rejected with [`HciError::Busy`]; commands to different SAPs run
//! concurrently.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::HciConfig;
use crate::error::{DecodeError, HciError, HciResult};
use crate::message::{HciCodec, HciMessage, HeaderLayout};
use crate::sap::{default_response_id, FnSap, ResponseMatch, ServiceAccessPoint};
use crate::slip::{self, SlipDecoder};
use crate::stats::{HciStats, HciStatsSnapshot};
use crate::transport::Transport;

const READ_CHUNK_SIZE: usize = 256;

/// Deadline used when `sent_at + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `start + timeout`, saturating to a far-future instant.
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

type ResultSlot = Sender<HciResult<HciMessage>>;

/// Outstanding command of one SAP.
struct PendingRequest {
    id: u64,
    expected: ResponseMatch,
    request_msg_id: u8,
    timeout: Duration,
    sent_at: Instant,
    deadline: Instant,
    slot: ResultSlot,
}

impl PendingRequest {
    fn timeout_error(&self) -> HciError {
        HciError::Timeout {
            sap_id: self.expected.sap_id,
            msg_id: self.request_msg_id,
            timeout: self.timeout,
        }
    }
}

/// Registry entry for one SAP.
struct SapSlot {
    sap: Arc<dyn ServiceAccessPoint>,
    pending: Option<PendingRequest>,
    /// Expectation of a cancelled or expired command whose response may
    /// still arrive.
    stale: Option<ResponseMatch>,
    next_tag: u8,
}

impl SapSlot {
    fn new(sap: Arc<dyn ServiceAccessPoint>) -> Self {
        SapSlot {
            sap,
            pending: None,
            stale: None,
            next_tag: 0,
        }
    }

    /// Drop the pending request and remember its expectation.
    fn retire_pending(&mut self) -> Option<PendingRequest> {
        let pending = self.pending.take()?;
        self.stale = Some(pending.expected);
        Some(pending)
    }
}

enum Route {
    Response(PendingRequest),
    Indication(Arc<dyn ServiceAccessPoint>),
    Stale,
    Unknown,
}

/// State shared by the client handles and the receiver.
struct Shared {
    config: HciConfig,
    codec: HciCodec,
    table: Mutex<HashMap<u8, SapSlot>>,
    transport: Mutex<Box<dyn Transport>>,
    closed: AtomicBool,
    next_request_id: AtomicU64,
    stats: HciStats,
}

impl Shared {
    fn pending_count(table: &HashMap<u8, SapSlot>) -> usize {
        table.values().filter(|slot| slot.pending.is_some()).count()
    }

    /// Route one decoded message. Returns true when it reached a consumer.
    fn route(&self, msg: HciMessage) -> bool {
        let header = msg.header();
        let route = {
            let mut table = self.table.lock();
            if self.is_closed() {
                return false;
            }
            match table.get_mut(&msg.sap_id) {
                None => Route::Unknown,
                Some(slot) => match slot.pending.take() {
                    Some(pending) if slot.sap.is_response(&pending.expected, &header) => {
                        Route::Response(pending)
                    }
                    pending => {
                        slot.pending = pending;
                        match slot.stale {
                            Some(stale) if slot.sap.is_response(&stale, &header) => {
                                slot.stale = None;
                                Route::Stale
                            }
                            _ => Route::Indication(slot.sap.clone()),
                        }
                    }
                },
            }
        };

        match route {
            Route::Response(pending) => {
                let latency = pending.sent_at.elapsed();
                trace!(
                    sap_id = msg.sap_id,
                    msg_id = msg.msg_id,
                    tag = ?msg.tag,
                    latency_us = latency.as_micros() as u64,
                    "response"
                );
                self.stats.response(msg.sap_id, latency);
                self.update_pending_gauge();
                // Capacity 1 and a single producer: this never blocks.
                let _ = pending.slot.try_send(Ok(msg));
                true
            }
            Route::Indication(sap) => {
                trace!(
                    sap_id = msg.sap_id,
                    msg_id = msg.msg_id,
                    len = msg.payload.len(),
                    sap = sap.name(),
                    "indication"
                );
                self.stats.indication(msg.sap_id);
                sap.on_indication(msg);
                true
            }
            Route::Stale => {
                debug!(
                    sap_id = msg.sap_id,
                    msg_id = msg.msg_id,
                    "dropping late response to cancelled command"
                );
                self.stats.stale_response(msg.sap_id);
                false
            }
            Route::Unknown => {
                warn!(sap_id = msg.sap_id, msg_id = msg.msg_id, "message for unregistered SAP");
                self.stats.unknown_sap(msg.sap_id);
                false
            }
        }
    }

    /// Expire one specific request if it is still pending.
    fn expire(&self, sap_id: u8, request_id: u64) {
        let mut table = self.table.lock();
        let Some(slot) = table.get_mut(&sap_id) else {
            return;
        };
        if slot.pending.as_ref().map(|p| p.id) != Some(request_id) {
            return;
        }
        if let Some(pending) = slot.retire_pending() {
            debug!(sap_id, msg_id = pending.request_msg_id, "command timed out");
            self.stats.timeout(sap_id);
            let _ = pending.slot.try_send(Err(pending.timeout_error()));
        }
        self.stats.pending_gauge(Self::pending_count(&table));
    }

    /// Cancel the pending request of `sap_id`, or only request `request_id`
    /// when given.
    fn cancel(&self, sap_id: u8, request_id: Option<u64>) -> bool {
        let mut table = self.table.lock();
        let Some(slot) = table.get_mut(&sap_id) else {
            return false;
        };
        let current = slot.pending.as_ref().map(|p| p.id);
        if current.is_none() || (request_id.is_some() && current != request_id) {
            return false;
        }
        let cancelled = match slot.retire_pending() {
            Some(pending) => {
                debug!(sap_id, msg_id = pending.request_msg_id, "command cancelled");
                let _ = pending.slot.try_send(Err(HciError::Cancelled { sap_id }));
                true
            }
            None => false,
        };
        self.stats.pending_gauge(Self::pending_count(&table));
        cancelled
    }

    fn sweep_expired(&self, now: Instant) -> usize {
        let mut table = self.table.lock();
        let mut expired = 0;
        for (&sap_id, slot) in table.iter_mut() {
            let due = slot.pending.as_ref().is_some_and(|p| p.deadline <= now);
            if !due {
                continue;
            }
            if let Some(pending) = slot.retire_pending() {
                debug!(sap_id, msg_id = pending.request_msg_id, "command timed out");
                self.stats.timeout(sap_id);
                let _ = pending.slot.try_send(Err(pending.timeout_error()));
                expired += 1;
            }
        }
        if expired > 0 {
            self.stats.pending_gauge(Self::pending_count(&table));
        }
        expired
    }

    fn update_pending_gauge(&self) {
        let table = self.table.lock();
        self.stats.pending_gauge(Self::pending_count(&table));
    }

    /// Close the core: fail every pending request and refuse further work.
    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut table = self.table.lock();
        let mut failed = 0;
        for slot in table.values_mut() {
            slot.stale = None;
            if let Some(pending) = slot.pending.take() {
                let _ = pending.slot.try_send(Err(HciError::TransportClosed));
                failed += 1;
            }
        }
        self.stats.pending_gauge(0);
        info!(reason, failed_commands = failed, "HCI transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Encode and write one message.
    fn write_message(&self, msg: &HciMessage) -> HciResult<()> {
        let frame = self.codec.encode_frame(msg)?;
        self.write_frame(msg, &frame)
    }

    /// Escape and write an encoded frame. A write failure closes the core.
    fn write_frame(&self, msg: &HciMessage, frame: &[u8]) -> HciResult<()> {
        let wire = slip::encode(frame, &self.config.markers);
        let result = self.transport.lock().send_frame(&wire);
        match result {
            Ok(()) => {
                trace!(
                    sap_id = msg.sap_id,
                    msg_id = msg.msg_id,
                    tag = ?msg.tag,
                    len = wire.len(),
                    "frame sent"
                );
                self.stats.bytes_sent(wire.len());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "transport write failed");
                self.close("write failed");
                Err(HciError::TransportClosed)
            }
        }
    }
}

/// Build a connected client/receiver pair over `transport`.
pub fn connect<T>(config: HciConfig, transport: T) -> HciResult<(HciClient, HciReceiver)>
where
    T: Transport + 'static,
{
    config.validate()?;
    let shared = Arc::new(Shared {
        codec: config.codec(),
        stats: HciStats::new(&config.link_name),
        table: Mutex::new(HashMap::new()),
        transport: Mutex::new(Box::new(transport)),
        closed: AtomicBool::new(false),
        next_request_id: AtomicU64::new(1),
        config,
    });
    let decoder = SlipDecoder::new(shared.config.markers, shared.config.max_frame_size);
    debug!(
        link = %shared.config.link_name,
        layout = ?shared.config.header_layout,
        max_frame_size = shared.config.max_frame_size,
        "HCI core created"
    );
    Ok((
        HciClient {
            shared: shared.clone(),
        },
        HciReceiver { shared, decoder },
    ))
}

/// A command to send.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Target SAP.
    pub sap_id: u8,
    /// Request message id.
    pub msg_id: u8,
    /// Request payload.
    pub payload: Bytes,
    /// Expected response message id; `msg_id + 1` when unset.
    pub response_msg_id: Option<u8>,
    /// Timeout; the configured default when unset.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// Create a request with the default response id and timeout.
    pub fn new(sap_id: u8, msg_id: u8, payload: impl Into<Bytes>) -> Self {
        CommandRequest {
            sap_id,
            msg_id,
            payload: payload.into(),
            response_msg_id: None,
            timeout: None,
        }
    }

    /// Expect a response id other than `msg_id + 1`.
    pub fn expect_response(mut self, msg_id: u8) -> Self {
        self.response_msg_id = Some(msg_id);
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Command-side handle. Cheap to clone; all clones share one core.
#[derive(Clone)]
pub struct HciClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for HciClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HciClient")
            .field("link", &self.shared.config.link_name)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl HciClient {
    /// Active configuration.
    pub fn config(&self) -> &HciConfig {
        &self.shared.config
    }

    /// Register a closure as the indication handler of `sap_id`.
    pub fn register<F>(&self, sap_id: u8, callback: F) -> HciResult<()>
    where
        F: Fn(HciMessage) + Send + Sync + 'static,
    {
        self.register_sap(Arc::new(FnSap::new(sap_id, callback)))
    }

    /// Register a SAP handler. Each SAP id can be registered once.
    pub fn register_sap(&self, sap: Arc<dyn ServiceAccessPoint>) -> HciResult<()> {
        let sap_id = sap.sap_id();
        let mut table = self.shared.table.lock();
        if table.contains_key(&sap_id) {
            return Err(HciError::AlreadyRegistered(sap_id));
        }
        debug!(sap_id, sap = sap.name(), "SAP registered");
        table.insert(sap_id, SapSlot::new(sap));
        Ok(())
    }

    /// Whether `sap_id` has a registered handler.
    pub fn is_registered(&self, sap_id: u8) -> bool {
        self.shared.table.lock().contains_key(&sap_id)
    }

    /// Whether `sap_id` has an outstanding command.
    pub fn has_pending(&self, sap_id: u8) -> bool {
        self.shared
            .table
            .lock()
            .get(&sap_id)
            .is_some_and(|slot| slot.pending.is_some())
    }

    /// Send a command and return a handle to its eventual response.
    ///
    /// The pending request is recorded before the frame is written, so a
    /// response that arrives immediately is never mistaken for an indication.
    pub fn begin_command(&self, request: CommandRequest) -> HciResult<PendingCommand> {
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.shared.config.default_timeout());
        let response_msg_id = request
            .response_msg_id
            .unwrap_or_else(|| default_response_id(request.msg_id));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);

        let (msg, frame, deadline) = {
            let mut table = self.shared.table.lock();
            if self.shared.is_closed() {
                return Err(HciError::TransportClosed);
            }
            let slot = table
                .get_mut(&request.sap_id)
                .ok_or(HciError::UnknownSap(request.sap_id))?;
            if slot.pending.is_some() {
                debug!(sap_id = request.sap_id, msg_id = request.msg_id, "SAP busy");
                self.shared.stats.busy(request.sap_id);
                return Err(HciError::Busy {
                    sap_id: request.sap_id,
                });
            }

            let tag = match self.shared.codec.layout() {
                HeaderLayout::Tagged => Some(slot.next_tag),
                HeaderLayout::Compact => None,
            };
            let msg = HciMessage {
                sap_id: request.sap_id,
                msg_id: request.msg_id,
                tag,
                payload: request.payload,
            };
            // Encode before claiming the slot so an oversized payload leaves it free.
            let frame = self.shared.codec.encode_frame(&msg)?;
            if tag.is_some() {
                slot.next_tag = slot.next_tag.wrapping_add(1);
            }

            let sent_at = Instant::now();
            let deadline = deadline_after(sent_at, timeout);
            slot.stale = None;
            slot.pending = Some(PendingRequest {
                id: request_id,
                expected: ResponseMatch {
                    sap_id: request.sap_id,
                    msg_id: response_msg_id,
                    tag,
                },
                request_msg_id: request.msg_id,
                timeout,
                sent_at,
                deadline,
                slot: tx,
            });
            self.shared.stats.pending_gauge(Shared::pending_count(&table));
            (msg, frame, deadline)
        };

        if let Err(e) = self.shared.write_frame(&msg, &frame) {
            self.shared.cancel(msg.sap_id, Some(request_id));
            return Err(e);
        }
        self.shared.stats.command_sent(msg.sap_id);
        debug!(
            sap_id = msg.sap_id,
            msg_id = msg.msg_id,
            tag = ?msg.tag,
            len = msg.payload.len(),
            timeout_ms = timeout.as_millis() as u64,
            "command sent"
        );

        Ok(PendingCommand {
            shared: self.shared.clone(),
            sap_id: msg.sap_id,
            msg_id: msg.msg_id,
            request_id,
            timeout,
            deadline,
            rx,
        })
    }

    /// Send a command and block until its response, timeout or cancellation.
    pub fn send_command(
        &self,
        sap_id: u8,
        msg_id: u8,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> HciResult<HciMessage> {
        self.begin_command(CommandRequest::new(sap_id, msg_id, payload).timeout(timeout))?
            .wait()
    }

    /// Send a message without expecting a response.
    ///
    /// Under [`HeaderLayout::Tagged`] the message must carry its own tag.
    pub fn send_message(&self, msg: &HciMessage) -> HciResult<()> {
        if self.shared.is_closed() {
            return Err(HciError::TransportClosed);
        }
        self.shared.write_message(msg)
    }

    /// Cancel whatever command is outstanding on `sap_id`. A caller blocked in
    /// [`PendingCommand::wait`] receives [`HciError::Cancelled`].
    pub fn cancel_pending(&self, sap_id: u8) -> bool {
        self.shared.cancel(sap_id, None)
    }

    /// Fail every pending command whose deadline is at or before `now`.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        self.shared.sweep_expired(now)
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> HciStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Close the core from the command side.
    pub fn shutdown(&self) {
        self.shared.close("shutdown");
    }

    /// Whether the core has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Handle to one in-flight command.
///
/// Dropping the handle without waiting cancels the command.
pub struct PendingCommand {
    shared: Arc<Shared>,
    sap_id: u8,
    msg_id: u8,
    request_id: u64,
    timeout: Duration,
    deadline: Instant,
    rx: Receiver<HciResult<HciMessage>>,
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("sap_id", &self.sap_id)
            .field("msg_id", &self.msg_id)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl PendingCommand {
    /// SAP the command was sent to.
    pub fn sap_id(&self) -> u8 {
        self.sap_id
    }

    /// Instant after which the command times out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Block until the response arrives or the deadline passes.
    pub fn wait(self) -> HciResult<HciMessage> {
        match self.rx.recv_deadline(self.deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.shared.expire(self.sap_id, self.request_id);
                // Either the expiry above or a response that won the race
                // has filled the slot by now.
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(self.timeout_error()),
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(HciError::TransportClosed),
        }
    }

    /// Take the result if it is already available.
    ///
    /// A result returned here is consumed; a later [`wait`](Self::wait)
    /// reports a timeout.
    pub fn try_result(&self) -> Option<HciResult<HciMessage>> {
        self.rx.try_recv().ok()
    }

    /// Abandon the command. Its late response, if any, is dropped.
    ///
    /// Returns false when the command had already completed or expired.
    pub fn cancel(self) -> bool {
        self.shared.cancel(self.sap_id, Some(self.request_id))
    }

    fn timeout_error(&self) -> HciError {
        HciError::Timeout {
            sap_id: self.sap_id,
            msg_id: self.msg_id,
            timeout: self.timeout,
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        // No-op once the request completed, expired or was cancelled.
        self.shared.cancel(self.sap_id, Some(self.request_id));
    }
}

/// The decode path. Exactly one exists per core.
pub struct HciReceiver {
    shared: Arc<Shared>,
    decoder: SlipDecoder,
}

impl std::fmt::Debug for HciReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HciReceiver")
            .field("link", &self.shared.config.link_name)
            .field("buffered", &self.decoder.buffered_len())
            .finish()
    }
}

impl HciReceiver {
    /// A new command-side handle for this core.
    pub fn client(&self) -> HciClient {
        HciClient {
            shared: self.shared.clone(),
        }
    }

    /// Feed raw transport bytes. Returns the number of messages delivered to
    /// a pending command or an indication handler.
    ///
    /// Malformed input is counted and skipped; it never fails the call. Once
    /// the core is closed, even partway through `bytes`, no further frame is
    /// routed and the call returns [`HciError::TransportClosed`].
    pub fn feed(&mut self, bytes: &[u8]) -> HciResult<usize> {
        if self.shared.is_closed() {
            return Err(HciError::TransportClosed);
        }
        self.shared.stats.bytes_received(bytes.len());

        let mut routed = 0;
        for &byte in bytes {
            match self.decoder.push_byte(byte) {
                None => {}
                Some(Ok(frame)) => {
                    // A callback or another handle may have closed the core.
                    if self.shared.is_closed() {
                        return Err(HciError::TransportClosed);
                    }
                    if self.process_frame(&frame) {
                        routed += 1;
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "framing error");
                    self.shared.stats.framing_error();
                }
            }
        }
        self.shared.sweep_expired(Instant::now());
        Ok(routed)
    }

    fn process_frame(&self, frame: &[u8]) -> bool {
        self.shared.stats.frame_received();
        match self.shared.codec.decode_frame(frame) {
            Ok(msg) => self.shared.route(msg),
            Err(DecodeError::Checksum(e)) => {
                debug!(error = %e, len = frame.len(), "dropping frame");
                self.shared.stats.checksum_error();
                false
            }
            Err(e) => {
                debug!(error = %e, len = frame.len(), "dropping frame");
                self.shared.stats.decode_error();
                false
            }
        }
    }

    /// Treat the transport as failed.
    pub fn close(&self) {
        self.shared.close("receiver closed");
    }

    /// Pump `reader` until end of stream or a hard error, then close.
    ///
    /// Read timeouts (`TimedOut`/`WouldBlock`) drive the expiry sweep, so a
    /// reader with a short timeout expires commands promptly even when the
    /// line is silent.
    pub fn run<R: Read>(mut self, mut reader: R) -> HciError {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    self.close();
                    return HciError::TransportClosed;
                }
                Ok(n) => {
                    if let Err(e) = self.feed(&buf[..n]) {
                        return e;
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    if self.shared.is_closed() {
                        return HciError::TransportClosed;
                    }
                    self.shared.sweep_expired(Instant::now());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "transport read failed");
                    self.close();
                    return HciError::from(e);
                }
            }
        }
    }

    /// Run [`run`](Self::run) on a dedicated thread.
    pub fn spawn<R>(self, reader: R) -> io::Result<JoinHandle<HciError>>
    where
        R: Read + Send + 'static,
    {
        let name = format!("hci-rx-{}", self.shared.config.link_name);
        thread::Builder::new().name(name).spawn(move || {
            let reason = self.run(reader);
            debug!(reason = %reason, "receiver thread exiting");
            reason
        })
    }
}
