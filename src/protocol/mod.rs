//! Link-layer protocol handling
//!
//! The controller only inspects Ethernet and 802.1Q headers of packet-in frames.

pub mod ethernet;
pub mod types;

pub use types::*;
