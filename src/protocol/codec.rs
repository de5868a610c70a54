use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{
    Error, DATA_CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_LENGTH, PREAMBLE_1, PREAMBLE_2,
};
use super::crc::{self, DATA_CRC_RESIDUE, HEADER_CRC_RESIDUE};
use super::frame::{Frame, FrameType, Header, Received};

/// Diagnostic counters kept by the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CodecStats {
    /// Frames handed upward with a valid header
    pub frames_decoded: u64,
    /// Headers discarded because their checksum did not verify
    pub header_crc_errors: u64,
    /// Payloads discarded because their checksum did not verify
    pub data_crc_errors: u64,
    /// Valid headers announcing more payload than we accept
    pub oversized: u64,
    /// Octets skipped while hunting for a preamble
    pub noise_octets: u64,
    /// Partial frames dropped after the line went silent
    pub aborted: u64,
}

/// Frame codec for the RS-485 byte stream
///
/// The decoder hunts for the two-octet preamble, verifies the header
/// checksum over the five header fields plus the checksum octet, and then
/// waits for the payload. Corrupted headers never produce output; the
/// decoder moves past the bad preamble and keeps hunting. A corrupted
/// payload produces [`Received::CorruptPayload`] so the state machine can
/// still account for the frame.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
    stats: CodecStats,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Creates a codec accepting payloads up to the standard maximum
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_LENGTH)
    }

    /// Creates a codec with a smaller receive buffer
    pub fn with_max_payload(max_payload: usize) -> Self {
        FrameCodec {
            max_payload: max_payload.min(MAX_PAYLOAD_LENGTH),
            stats: CodecStats::default(),
        }
    }

    /// Largest payload this codec encodes or decodes
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Counters accumulated since creation
    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Drops a partially received frame after the line went silent
    ///
    /// Returns true when a frame had started, i.e. a full preamble was
    /// buffered. A lone first preamble octet is discarded as noise.
    pub fn abort_partial(&mut self, src: &mut BytesMut) -> bool {
        if src.len() < 2 {
            self.stats.noise_octets += src.len() as u64;
            src.clear();
            return false;
        }
        self.stats.aborted += 1;
        src.clear();
        true
    }

    /// Skips to the next preamble, returning false if none is buffered
    fn hunt(&mut self, src: &mut BytesMut) -> bool {
        match src.windows(2).position(|w| *w == [PREAMBLE_1, PREAMBLE_2]) {
            Some(start) => {
                self.stats.noise_octets += start as u64;
                src.advance(start);
                true
            }
            None => {
                // a trailing first preamble octet may still be completed
                let keep = usize::from(src.last() == Some(&PREAMBLE_1));
                let skip = src.len() - keep;
                self.stats.noise_octets += skip as u64;
                src.advance(skip);
                false
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Received;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if !self.hunt(src) || src.len() < HEADER_SIZE {
                return Ok(None);
            }

            if crc::header_crc_register(&src[2..HEADER_SIZE]) != HEADER_CRC_RESIDUE {
                self.stats.header_crc_errors += 1;
                src.advance(2);
                continue;
            }

            let header = Header {
                frame_type: FrameType::from(src[2]),
                destination: src[3],
                source: src[4],
                length: u16::from_be_bytes([src[5], src[6]]),
            };
            let length = header.length as usize;

            if length > self.max_payload {
                self.stats.oversized += 1;
                src.advance(HEADER_SIZE);
                continue;
            }

            if length == 0 {
                src.advance(HEADER_SIZE);
                self.stats.frames_decoded += 1;
                return Ok(Some(Received::Frame(Frame::new(
                    header.frame_type,
                    header.destination,
                    header.source,
                    Bytes::new(),
                ))));
            }

            let total = HEADER_SIZE + length + DATA_CRC_SIZE;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let mut raw = src.split_to(total);
            raw.advance(HEADER_SIZE);
            self.stats.frames_decoded += 1;

            if crc::data_crc_register(&raw) != DATA_CRC_RESIDUE {
                self.stats.data_crc_errors += 1;
                return Ok(Some(Received::CorruptPayload(header)));
            }

            raw.truncate(length);
            return Ok(Some(Received::Frame(Frame::new(
                header.frame_type,
                header.destination,
                header.source,
                raw.freeze(),
            ))));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(received) => Ok(Some(received)),
            None => {
                self.abort_partial(src);
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, self.max_payload, dst)
    }
}

impl<'a> Encoder<&'a Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: &'a Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(item, self.max_payload, dst)
    }
}

fn encode_into(frame: &Frame, max_payload: usize, dst: &mut BytesMut) -> Result<(), Error> {
    if frame.data.len() > max_payload {
        return Err(Error::protocol(format!(
            "payload of {} octets exceeds {}",
            frame.data.len(),
            max_payload
        )));
    }

    let header = frame.header().octets();
    let extra = if frame.data.is_empty() { 0 } else { frame.data.len() + DATA_CRC_SIZE };
    dst.reserve(HEADER_SIZE + extra);

    dst.put_u8(PREAMBLE_1);
    dst.put_u8(PREAMBLE_2);
    dst.put_slice(&header);
    dst.put_u8(crc::header_crc(&header));

    if !frame.data.is_empty() {
        dst.put_slice(&frame.data);
        dst.put_u16_le(crc::data_crc(&frame.data));
    }

    Ok(())
}
