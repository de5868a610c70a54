use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result};
use crate::protocol::{CodecStats, Frame, FrameCodec, FrameSink, Input};
use crate::time::BitTiming;

/// Size of the buffer handed to each read
const READ_CHUNK: usize = 512;

/// Frames that may wait for the turnaround at once
///
/// The engine sends at most a handful of frames per step, so reaching this
/// means the line is never quiet long enough to transmit.
pub const MAX_PENDING_FRAMES: usize = 64;

/// Byte-level access to the shared medium
///
/// Implementations must never block: `read_available` returns the octets
/// already received (possibly none) and `write_all` queues octets for the
/// line driver.
pub trait Transceiver: Send {
    /// Copies buffered octets into `buf`, returning how many were copied
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Puts `octets` on the line
    fn write_all(&mut self, octets: &[u8]) -> io::Result<()>;
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }

    fn write_all(&mut self, octets: &[u8]) -> io::Result<()> {
        (**self).write_all(octets)
    }
}

/// Framing layer between a transceiver and the engine
///
/// Incoming octets are accumulated and decoded into [`Input`]s. Outgoing
/// frames are encoded at once but only written after the line turnaround
/// has elapsed since the last received octet.
pub struct Link<T> {
    transceiver: T,
    codec: FrameCodec,
    timing: BitTiming,
    rx: BytesMut,
    last_rx: Option<Instant>,
    pending: VecDeque<Bytes>,
    octets_written: u64,
}

impl<T: Transceiver> Link<T> {
    /// Creates a link for the given line speed and payload limit
    pub fn new(transceiver: T, timing: BitTiming, max_payload: usize) -> Self {
        Link {
            transceiver,
            codec: FrameCodec::with_max_payload(max_payload),
            timing,
            rx: BytesMut::with_capacity(READ_CHUNK * 2),
            last_rx: None,
            pending: VecDeque::new(),
            octets_written: 0,
        }
    }

    pub fn timing(&self) -> BitTiming {
        self.timing
    }

    pub fn codec_stats(&self) -> CodecStats {
        self.codec.stats()
    }

    /// Frames encoded but still held back by the turnaround
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    pub fn octets_written(&self) -> u64 {
        self.octets_written
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Reads everything the transceiver has and decodes it
    ///
    /// Emits `LineActivity` when octets arrived, then one `Frame` per
    /// decoded frame. When nothing arrived and a partial frame has been
    /// sitting for the frame-abort interval, emits `FrameAborted`.
    pub fn poll_input(&mut self, now: Instant) -> Result<Vec<Input>> {
        let mut inputs = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        let mut received = false;

        loop {
            let n = self.transceiver.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.rx.extend_from_slice(&chunk[..n]);
            received = true;
            if n < chunk.len() {
                break;
            }
        }

        if received {
            self.last_rx = Some(now);
            inputs.push(Input::LineActivity);
            while let Some(frame) = self.codec.decode(&mut self.rx)? {
                inputs.push(Input::Frame(frame));
            }
        } else if self.partial_expired(now) && self.codec.abort_partial(&mut self.rx) {
            inputs.push(Input::FrameAborted);
        }

        Ok(inputs)
    }

    /// Writes held-back frames once the turnaround has elapsed
    ///
    /// Returns the number of frames written.
    pub fn flush(&mut self, now: Instant) -> Result<usize> {
        if self.pending.is_empty() || !self.turnaround_elapsed(now) {
            return Ok(0);
        }
        let mut written = 0;
        while let Some(octets) = self.pending.pop_front() {
            self.transceiver.write_all(&octets)?;
            self.octets_written += octets.len() as u64;
            written += 1;
        }
        Ok(written)
    }

    fn turnaround_elapsed(&self, now: Instant) -> bool {
        self.last_rx
            .map(|last| now.saturating_duration_since(last) >= self.timing.turnaround())
            .unwrap_or(true)
    }

    fn partial_expired(&self, now: Instant) -> bool {
        !self.rx.is_empty()
            && self
                .last_rx
                .map(|last| now.saturating_duration_since(last) >= self.timing.frame_abort())
                .unwrap_or(false)
    }
}

impl<T: Transceiver> FrameSink for Link<T> {
    fn transmit(&mut self, now: Instant, frame: &Frame) -> Result<()> {
        if self.pending.len() >= MAX_PENDING_FRAMES {
            return Err(Error::protocol(format!(
                "{} frames waiting for line turnaround",
                self.pending.len()
            )));
        }
        let mut octets = BytesMut::new();
        self.codec.encode(frame, &mut octets)?;
        self.pending.push_back(octets.freeze());
        self.flush(now)?;
        Ok(())
    }
}
