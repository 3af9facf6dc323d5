//! Service access point interface.
//!
//! Every subsystem registers one [`ServiceAccessPoint`] under its SAP id. The
//! dispatcher asks the SAP whether a decoded message answers its outstanding
//! command and otherwise hands the message to
//! [`on_indication`](ServiceAccessPoint::on_indication).

use crate::message::{HciHeader, HciMessage};

/// Response id for a request under the default request/response convention.
pub const fn default_response_id(request_msg_id: u8) -> u8 {
    request_msg_id.wrapping_add(1)
}

/// Header fields a response must carry to complete a pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMatch {
    /// SAP the command was sent to.
    pub sap_id: u8,
    /// Expected response message id.
    pub msg_id: u8,
    /// Expected correlation tag; `None` accepts any tag.
    pub tag: Option<u8>,
}

impl ResponseMatch {
    /// Default matching rule: same SAP, expected message id, and the tag when
    /// one was recorded.
    pub fn matches(&self, header: &HciHeader) -> bool {
        header.sap_id == self.sap_id
            && header.msg_id == self.msg_id
            && match self.tag {
                Some(tag) => header.tag == Some(tag),
                None => true,
            }
    }
}

/// A subsystem handler.
///
/// Implementations must be cheap and non-blocking in
/// [`on_indication`](Self::on_indication): it runs on the decode path, and a
/// blocking command issued from there would stall every SAP.
pub trait ServiceAccessPoint: Send + Sync {
    /// SAP identifier this handler serves.
    fn sap_id(&self) -> u8;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "sap"
    }

    /// Called for every message of this SAP that does not complete the
    /// pending command.
    fn on_indication(&self, msg: HciMessage);

    /// Whether `header` completes the pending command described by `expected`.
    ///
    /// Must be a pure function of its arguments.
    fn is_response(&self, expected: &ResponseMatch, header: &HciHeader) -> bool {
        expected.matches(header)
    }
}

/// SAP backed by a closure.
pub struct FnSap<F> {
    sap_id: u8,
    name: String,
    callback: F,
}

impl<F> FnSap<F>
where
    F: Fn(HciMessage) + Send + Sync,
{
    /// Create a SAP that forwards indications to `callback`.
    pub fn new(sap_id: u8, callback: F) -> Self {
        FnSap {
            sap_id,
            name: format!("sap-0x{:02X}", sap_id),
            callback,
        }
    }

    /// Override the log name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> ServiceAccessPoint for FnSap<F>
where
    F: Fn(HciMessage) + Send + Sync,
{
    fn sap_id(&self) -> u8 {
        self.sap_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_indication(&self, msg: HciMessage) {
        (self.callback)(msg)
    }
}

impl<F> std::fmt::Debug for FnSap<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSap")
            .field("sap_id", &self.sap_id)
            .field("name", &self.name)
            .finish()
    }
}
