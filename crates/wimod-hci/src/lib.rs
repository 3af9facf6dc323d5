//! WiMOD Host Controller Interface
//!
//! Host-side transport core for WiMOD radio modules. A host and a module
//! exchange HCI messages over a byte stream (typically a UART):
//!
//! ```text
//! wire:    END | escaped( header | payload | crc16 ) | END
//! header:  sap_id | msg_id [| tag]
//! ```
//!
//! # Layers
//!
//! - [`slip`]: SLIP byte-stuffing and frame delimitation, resynchronizing on
//!   the next END after any error.
//! - [`crc`]: CRC-16/X-25 over header and payload.
//! - [`message`]: the [`HciMessage`] model and [`HciCodec`].
//! - [`dispatcher`]: correlates commands with responses (one outstanding
//!   command per SAP) and routes everything else to the SAP's indication
//!   handler.
//! - [`saps`]: thin typed adapters for device management, radio link test,
//!   remote control and the sensor application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use wimod_hci::{connect, HciConfig, IoTransport};
//!
//! let port = serial::open("/dev/ttyUSB0")?;
//! let (client, receiver) = connect(HciConfig::default(), IoTransport::new(port.try_clone()?))?;
//! client.register(0x04, |msg| println!("remote control: {:?}", msg))?;
//! receiver.spawn(port)?;
//!
//! client.register(0x01, |_| {})?;
//! let rsp = client.send_command(0x01, 0x01, Vec::new(), Duration::from_secs(1))?;
//! ```

pub mod config;
pub mod constants;
pub mod crc;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod sap;
pub mod saps;
pub mod slip;
mod stats;
pub mod transport;

pub use config::HciConfig;
pub use dispatcher::{connect, CommandRequest, HciClient, HciReceiver, PendingCommand};
pub use error::{ChecksumError, DecodeError, FramingError, HciError, HciResult};
pub use message::{HciCodec, HciHeader, HciMessage, HeaderLayout};
pub use sap::{FnSap, ResponseMatch, ServiceAccessPoint};
pub use slip::{SlipDecoder, SlipMarkers};
pub use stats::HciStatsSnapshot;
pub use transport::{ChannelTransport, IoTransport, Transport};
