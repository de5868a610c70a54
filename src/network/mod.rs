//! Line access and scheduling
//!
//! This module connects the engine to an RS-485 segment. A [`Transceiver`]
//! moves raw octets, a [`Link`] frames them and enforces line timing, a
//! [`Station`] pairs a link with a node, and the [`LinkDriver`] runs a
//! station on the tokio runtime behind a [`DriverHandle`].
//!
//! [`SerialTransceiver`] talks to a real port; [`SimulatedBus`] joins any
//! number of stations in memory.

pub mod bus;
pub mod driver;
pub mod link;
pub mod serial;
pub mod station;

pub use self::bus::{BusTap, SimulatedBus};
pub use self::driver::{DriverHandle, LinkDriver, DEFAULT_TICK};
pub use self::link::{Link, Transceiver, MAX_PENDING_FRAMES};
pub use self::serial::SerialTransceiver;
pub use self::station::Station;
