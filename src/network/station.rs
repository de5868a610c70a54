use std::time::Instant;

use bytes::Bytes;

use crate::core::{NodeConfig, Result};
use crate::protocol::{Delivery, Input, MasterNode, Outbound, RingEvent, Status};
use crate::time::BitTiming;
use super::link::{Link, Transceiver};

/// A master node wired to its line
///
/// `Station` is the synchronous core of the driver: one [`tick`](Station::tick)
/// writes whatever the turnaround was holding back, feeds every received
/// input to the engine and then lets the engine act on elapsed time.
pub struct Station<T> {
    node: MasterNode,
    link: Link<T>,
}

impl<T: Transceiver> Station<T> {
    pub fn new(config: NodeConfig, transceiver: T, now: Instant) -> Result<Self> {
        let link = Link::new(transceiver, BitTiming::new(config.baud_rate), config.max_payload);
        let node = MasterNode::new(config, now)?;
        Ok(Station { node, link })
    }

    /// Runs one scheduling pass
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        self.link.flush(now)?;
        for input in self.link.poll_input(now)? {
            self.node.step(now, input, &mut self.link)?;
        }
        self.node.step(now, Input::Tick, &mut self.link)
    }

    pub fn enqueue(&mut self, outbound: Outbound) -> Result<()> {
        self.node.enqueue(outbound)
    }

    pub fn next_delivery(&mut self) -> Option<Delivery> {
        self.node.next_delivery()
    }

    pub fn drain_events(&mut self) -> Vec<RingEvent> {
        self.node.drain_events()
    }

    /// Answers the pending request with `payload`
    pub fn reply(&mut self, now: Instant, payload: impl Into<Bytes>) -> Result<()> {
        self.node.submit_reply(now, payload, &mut self.link)
    }

    /// Tells the pending requester to poll again later
    pub fn decline(&mut self, now: Instant) -> Result<()> {
        self.node.decline_reply(now, &mut self.link)
    }

    pub fn reset(&mut self, now: Instant) {
        self.node.reset(now);
    }

    pub fn status(&self, now: Instant) -> Status {
        self.node.status(now)
    }

    pub fn node(&self) -> &MasterNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut MasterNode {
        &mut self.node
    }

    pub fn link(&self) -> &Link<T> {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::bus::{BusTap, SimulatedBus};
    use crate::protocol::MasterState;
    use crate::time::{Clock, ManualClock};
    use std::time::Duration;

    fn config(station: u8) -> NodeConfig {
        NodeConfig {
            station,
            max_master: 3,
            poll_interval: 4,
            ..NodeConfig::for_station(station)
        }
    }

    fn ring(stations: &[u8], clock: &ManualClock) -> (SimulatedBus, Vec<Station<BusTap>>) {
        let bus = SimulatedBus::new();
        let nodes = stations
            .iter()
            .map(|&ts| Station::new(config(ts), bus.attach(), clock.now()).unwrap())
            .collect();
        (bus, nodes)
    }

    fn run(nodes: &mut [Station<BusTap>], clock: &ManualClock, millis: u64) {
        for _ in 0..millis {
            clock.advance(Duration::from_millis(1));
            for node in nodes.iter_mut() {
                node.tick(clock.now()).unwrap();
            }
            let holders = nodes.iter().filter(|n| n.node().state().holds_token()).count();
            assert!(holders <= 1, "{} stations hold the token", holders);
        }
    }

    #[test]
    fn test_two_stations_form_a_ring() {
        let clock = ManualClock::new();
        let (bus, mut nodes) = ring(&[1, 2], &clock);
        nodes[1]
            .enqueue(Outbound::new(Bytes::from_static(b"hello"), 1, false))
            .unwrap();

        run(&mut nodes, &clock, 3000);

        let delivery = nodes[0].next_delivery().expect("payload delivered to station 1");
        assert_eq!(delivery.source, 2);
        assert_eq!(&delivery.payload[..], b"hello");
        assert!(!delivery.expects_reply);

        assert_eq!(nodes[0].node().ring().next_station(), 2);
        assert_eq!(nodes[1].node().ring().next_station(), 1);
        assert!(nodes[0].node().stats().tokens_passed > 10);
        assert!(nodes[1].node().stats().tokens_received > 10);
        assert!(bus.octets_carried() > 0);
    }

    #[test]
    fn test_request_answered_through_station() {
        let clock = ManualClock::new();
        let (_bus, mut nodes) = ring(&[1, 2], &clock);
        nodes[0]
            .enqueue(Outbound::new(Bytes::from_static(b"read"), 2, true))
            .unwrap();

        let mut answered = false;
        for _ in 0..3000 {
            clock.advance(Duration::from_millis(1));
            for node in nodes.iter_mut() {
                node.tick(clock.now()).unwrap();
            }
            if nodes[1].node().state() == MasterState::AnswerDataRequest {
                let request = nodes[1].next_delivery().unwrap();
                assert!(request.expects_reply);
                nodes[1].reply(clock.now(), &b"value"[..]).unwrap();
                answered = true;
            }
            if let Some(reply) = nodes[0].next_delivery() {
                assert!(answered);
                assert_eq!(reply.source, 2);
                assert_eq!(&reply.payload[..], b"value");
                return;
            }
        }
        panic!("reply never reached station 1");
    }

    #[test]
    fn test_lone_station_becomes_sole_master() {
        let clock = ManualClock::new();
        let (_bus, mut nodes) = ring(&[2], &clock);
        run(&mut nodes, &clock, 3000);

        let node = nodes[0].node();
        assert!(node.ring().sole_master());
        assert_eq!(node.stats().sole_master_promotions, 1);
        assert_eq!(nodes[0].status(clock.now()).station, 2);
    }
}
