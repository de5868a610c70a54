use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::link::Transceiver;

#[derive(Debug, Default)]
struct Medium {
    inboxes: Vec<VecDeque<u8>>,
    octets_carried: u64,
}

/// In-memory RS-485 segment
///
/// Every octet written by one tap is delivered to every other tap, in write
/// order. Nothing is echoed back to the writer and there is no collision
/// model: two taps writing in the same tick simply interleave whole writes.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    medium: Arc<Mutex<Medium>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new station to the segment
    pub fn attach(&self) -> BusTap {
        let mut medium = self.lock();
        medium.inboxes.push(VecDeque::new());
        BusTap {
            bus: self.clone(),
            id: medium.inboxes.len() - 1,
        }
    }

    /// Number of taps attached so far
    pub fn taps(&self) -> usize {
        self.lock().inboxes.len()
    }

    /// Puts octets on the line as if from an outside device
    pub fn inject(&self, octets: &[u8]) {
        let mut medium = self.lock();
        medium.octets_carried += octets.len() as u64;
        for inbox in medium.inboxes.iter_mut() {
            inbox.extend(octets);
        }
    }

    /// Total octets written to the segment
    pub fn octets_carried(&self) -> u64 {
        self.lock().octets_carried
    }

    fn lock(&self) -> MutexGuard<'_, Medium> {
        self.medium.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One station's connection to a [`SimulatedBus`]
#[derive(Debug)]
pub struct BusTap {
    bus: SimulatedBus,
    id: usize,
}

impl BusTap {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Transceiver for BusTap {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut medium = self.bus.lock();
        let inbox = &mut medium.inboxes[self.id];
        let n = buf.len().min(inbox.len());
        for (slot, octet) in buf.iter_mut().zip(inbox.drain(..n)) {
            *slot = octet;
        }
        Ok(n)
    }

    fn write_all(&mut self, octets: &[u8]) -> io::Result<()> {
        let mut medium = self.bus.lock();
        medium.octets_carried += octets.len() as u64;
        for (id, inbox) in medium.inboxes.iter_mut().enumerate() {
            if id != self.id {
                inbox.extend(octets);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_reach_every_other_tap() {
        let bus = SimulatedBus::new();
        let mut a = bus.attach();
        let mut b = bus.attach();
        let mut c = bus.attach();
        assert_eq!(bus.taps(), 3);

        a.write_all(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(a.read_available(&mut buf).unwrap(), 0);
        assert_eq!(b.read_available(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(c.read_available(&mut buf[..2]).unwrap(), 2);
        assert_eq!(c.read_available(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_inject_reaches_all_taps() {
        let bus = SimulatedBus::new();
        let mut a = bus.attach();
        bus.inject(&[0xAA, 0x55]);

        let mut buf = [0u8; 4];
        assert_eq!(a.read_available(&mut buf).unwrap(), 2);
        assert_eq!(bus.octets_carried(), 2);
    }
}
