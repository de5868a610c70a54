//! MS/TP master-node data link
//!
//! This library implements the master side of the token-passing protocol
//! used by BACnet MS/TP on RS-485 segments: frame encoding and checksums,
//! a deterministic master node state machine that holds, uses and passes
//! the token, discovery of successor masters, and recovery from lost
//! tokens and silent stations.
//!
//! The [`protocol::MasterNode`] engine is a plain value driven with
//! explicit instants. [`network::LinkDriver`] runs one on the tokio
//! runtime over a serial port or a [`network::SimulatedBus`].

pub mod core;
pub mod network;
pub mod protocol;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, NodeConfig, OverflowPolicy, Result, Timeouts};
pub use crate::network::{DriverHandle, LinkDriver, SerialTransceiver, SimulatedBus, Station};
pub use crate::protocol::{Delivery, Frame, FrameType, MasterNode, MasterState, Outbound};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
