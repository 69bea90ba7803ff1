//! # PBus
//!
//! Async UDP client for the PBus memory-mapped control protocol spoken by
//! networked audio amplifiers.
//!
//! PBus models the device as a flat 32-bit address space: a controller reads
//! and writes opaque byte ranges, and the device answers each command in a
//! batch positionally. Frames are delimited, escaped, and CRC-protected, and
//! every request carries a 4-byte tag so replies can be demultiplexed back to
//! the caller that issued them, even with many requests in flight over a
//! lossy network.
//!
//! ## Frame Format
//!
//! ```text
//! ┌─────┬──────────────────────────────────────────────────────┬─────┐
//! │ STX │  ESCAPED( TAG(4) ++ RECORD* ++ CRC16-LE(2) )         │ ETX │
//! │0x02 │                                                      │0x03 │
//! └─────┴──────────────────────────────────────────────────────┴─────┘
//!
//! request record:   opcode(1) ++ address:u32-LE ++ size:u32-LE ++ [payload if write]
//! response payload: "MZO" ++ protocol_id:u16-LE ++ TAG(4) ++ record*
//! ```
//!
//! ## Layers
//!
//! - [`protocol`] — pure codec: CRC16, byte escaping, command/response
//!   records, frame build/parse.
//! - [`transport`] — a [`transport::Connection`] owning one UDP socket plus
//!   the pending-request table that correlates replies by tag, and
//!   [`transport::discover`] for broadcast device discovery.
//! - [`config`] — TOML configuration and logging setup.
//!
//! Register semantics (what a given address means) are deliberately outside
//! this crate; consumers interpret payloads with [`protocol::values`].

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use types::Tag;

use std::net::Ipv4Addr;
use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// UDP port the amplifiers listen on
pub const DEFAULT_PORT: u16 = 8002;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest datagram we expect from a device
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Address used for discovery broadcasts
pub const BROADCAST_ADDRESS: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Command, Opcode, Response};
    pub use crate::transport::{discover, Connection, ConnectionConfig, DiscoveryConfig};
    pub use crate::types::Tag;
}
