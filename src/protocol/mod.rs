//! Protocol implementation module
//!
//! This module defines the MS/TP wire frames and their checksums, the
//! stream codec, the bounded queues between the engine and the upper
//! layer, fault classification, and the master node state machine.

pub mod codec;
pub mod crc;
pub mod frame;
pub mod queue;
pub mod recovery;
pub mod state;

pub use self::codec::{CodecStats, FrameCodec};
pub use self::frame::{Frame, FrameType, Header, Received, NOT_A_REPLY};
pub use self::queue::{BoundedQueue, Delivery, Outbound};
pub use self::recovery::{classify, Fault, Recovery, RingStats};
pub use self::state::{
    FrameSink, Handoff, Input, MasterNode, MasterState, RingEvent, RingState, Status, Sweep,
    SweepKind,
};
