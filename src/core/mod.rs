//! Core types for the MS/TP data link
//!
//! This module contains the error type, station configuration and the
//! address constants shared by every other module.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, QueueKind, Result};
pub use self::types::{
    NodeConfig,
    OverflowPolicy,
    Timeouts,
    BROADCAST_ADDRESS,
    MAX_MASTER_ADDRESS,
    MAX_PAYLOAD_LENGTH,
    SUPPORTED_BAUD_RATES,
};

/// First preamble octet
pub const PREAMBLE_1: u8 = 0x55;

/// Second preamble octet
pub const PREAMBLE_2: u8 = 0xFF;

/// Preamble plus the fixed header fields and header checksum
pub const HEADER_SIZE: usize = 8;

/// Trailing payload checksum size
pub const DATA_CRC_SIZE: usize = 2;
