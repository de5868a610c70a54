use std::fmt;

use bytes::Bytes;

use crate::core::BROADCAST_ADDRESS;

/// Frame type tag carried in the third octet of every frame
///
/// Tags 0 to 7 are defined by the standard, 128 to 255 are reserved for
/// vendors, anything else is kept as `Unknown` so that a newer peer's frames
/// can still be classified and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Token,
    PollForMaster,
    ReplyToPollForMaster,
    TestRequest,
    TestResponse,
    DataExpectingReply,
    DataNotExpectingReply,
    ReplyPostponed,
    /// Vendor-private tag (128..=255)
    Proprietary(u8),
    /// Reserved tag this implementation does not know (8..=127)
    Unknown(u8),
}

/// Frame types that can never be the answer to a request
///
/// Everything outside this list, including tags this station has never
/// heard of, is accepted while waiting for a reply.
pub const NOT_A_REPLY: [FrameType; 4] = [
    FrameType::Token,
    FrameType::PollForMaster,
    FrameType::ReplyToPollForMaster,
    FrameType::TestRequest,
];

impl FrameType {
    /// Wire value of the tag
    pub fn tag(self) -> u8 {
        match self {
            FrameType::Token => 0,
            FrameType::PollForMaster => 1,
            FrameType::ReplyToPollForMaster => 2,
            FrameType::TestRequest => 3,
            FrameType::TestResponse => 4,
            FrameType::DataExpectingReply => 5,
            FrameType::DataNotExpectingReply => 6,
            FrameType::ReplyPostponed => 7,
            FrameType::Proprietary(tag) | FrameType::Unknown(tag) => tag,
        }
    }

    /// Whether a frame of this type may complete a reply wait
    pub fn may_be_reply(self) -> bool {
        !NOT_A_REPLY.contains(&self)
    }

    /// Whether frames of this type carry application payload
    pub fn carries_data(self) -> bool {
        matches!(
            self,
            FrameType::DataExpectingReply | FrameType::DataNotExpectingReply
        )
    }
}

impl From<u8> for FrameType {
    fn from(tag: u8) -> Self {
        match tag {
            0 => FrameType::Token,
            1 => FrameType::PollForMaster,
            2 => FrameType::ReplyToPollForMaster,
            3 => FrameType::TestRequest,
            4 => FrameType::TestResponse,
            5 => FrameType::DataExpectingReply,
            6 => FrameType::DataNotExpectingReply,
            7 => FrameType::ReplyPostponed,
            128..=255 => FrameType::Proprietary(tag),
            _ => FrameType::Unknown(tag),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> Self {
        frame_type.tag()
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Proprietary(tag) => write!(f, "Proprietary({:#04x})", tag),
            FrameType::Unknown(tag) => write!(f, "Unknown({:#04x})", tag),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Fixed header fields of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub frame_type: FrameType,
    pub destination: u8,
    pub source: u8,
    pub length: u16,
}

impl Header {
    /// The five octets covered by the header checksum
    pub fn octets(&self) -> [u8; 5] {
        let [hi, lo] = self.length.to_be_bytes();
        [self.frame_type.tag(), self.destination, self.source, hi, lo]
    }

    /// Whether the frame is addressed to every station
    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }
}

/// A complete, checksum-valid frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub destination: u8,
    pub source: u8,
    pub data: Bytes,
}

impl Frame {
    /// Creates a frame with the given payload
    pub fn new(frame_type: FrameType, destination: u8, source: u8, data: impl Into<Bytes>) -> Self {
        Frame {
            frame_type,
            destination,
            source,
            data: data.into(),
        }
    }

    /// Token hand-off from `source` to `destination`
    pub fn token(destination: u8, source: u8) -> Self {
        Self::new(FrameType::Token, destination, source, Bytes::new())
    }

    /// Discovery probe sent to `destination`
    pub fn poll_for_master(destination: u8, source: u8) -> Self {
        Self::new(FrameType::PollForMaster, destination, source, Bytes::new())
    }

    /// Answer to a discovery probe received from `destination`
    pub fn reply_to_poll(destination: u8, source: u8) -> Self {
        Self::new(FrameType::ReplyToPollForMaster, destination, source, Bytes::new())
    }

    /// Payload frame, typed by whether an answer is awaited
    pub fn data(destination: u8, source: u8, data: impl Into<Bytes>, expects_reply: bool) -> Self {
        let frame_type = if expects_reply {
            FrameType::DataExpectingReply
        } else {
            FrameType::DataNotExpectingReply
        };
        Self::new(frame_type, destination, source, data)
    }

    /// Header describing this frame
    pub fn header(&self) -> Header {
        Header {
            frame_type: self.frame_type,
            destination: self.destination,
            source: self.source,
            length: self.data.len() as u16,
        }
    }

    /// Whether the frame is addressed to every station
    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }
}

/// What the codec hands upward for each frame whose header checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Header and payload (if any) both valid
    Frame(Frame),
    /// Header valid, payload checksum failed; the payload is gone
    CorruptPayload(Header),
}

impl Received {
    /// Header fields, available whether or not the payload survived
    pub fn header(&self) -> Header {
        match self {
            Received::Frame(frame) => frame.header(),
            Received::CorruptPayload(header) => *header,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.header().frame_type
    }

    pub fn destination(&self) -> u8 {
        self.header().destination
    }

    pub fn source(&self) -> u8 {
        self.header().source
    }

    /// Payload, if it arrived intact
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Received::Frame(frame) => Some(&frame.data),
            Received::CorruptPayload(_) => None,
        }
    }
}
