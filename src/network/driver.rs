use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::core::{Error, NodeConfig, Result};
use crate::protocol::{Delivery, Fault, Outbound, RingEvent, Status};
use crate::time::{Clock, MonotonicClock};
use super::link::Transceiver;
use super::station::Station;

/// Default scheduling period
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// Depth of the command channel between handles and the driver
const COMMAND_BUFFER: usize = 32;

/// Request sent from a [`DriverHandle`] to the driver task
enum Command {
    Send {
        outbound: Outbound,
        ack: oneshot::Sender<Result<()>>,
    },
    Reply {
        payload: Bytes,
        ack: oneshot::Sender<Result<()>>,
    },
    Decline {
        ack: oneshot::Sender<Result<()>>,
    },
    Status {
        ack: oneshot::Sender<Status>,
    },
    Reset {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running [`LinkDriver`]
#[derive(Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<Command>,
}

impl DriverHandle {
    /// Queues a payload for the next token hold
    pub async fn send(&self, outbound: Outbound) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.request(Command::Send { outbound, ack }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Answers the request the node is currently holding
    pub async fn reply(&self, payload: impl Into<Bytes>) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.request(Command::Reply { payload: payload.into(), ack }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Postpones the answer to the pending request
    pub async fn decline(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.request(Command::Decline { ack }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn status(&self) -> Result<Status> {
        let (ack, rx) = oneshot::channel();
        self.request(Command::Status { ack }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Puts the node back in INITIALIZE
    pub async fn reset(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.request(Command::Reset { ack }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    async fn request(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::Closed)
    }
}

/// Async task that owns a station and ticks it
///
/// Received payloads are forwarded on the delivery channel. When that
/// channel is full they stay in the node's inbound queue, whose overflow
/// policy then applies. The driver stops once every [`DriverHandle`] has
/// been dropped.
pub struct LinkDriver<T, C = MonotonicClock> {
    station: Station<T>,
    clock: C,
    tick: Duration,
    commands: mpsc::Receiver<Command>,
    deliveries: mpsc::Sender<Delivery>,
}

impl<T: Transceiver> LinkDriver<T> {
    /// Creates a driver on the runtime clock
    pub fn new(
        config: NodeConfig,
        transceiver: T,
        deliveries: mpsc::Sender<Delivery>,
    ) -> Result<(Self, DriverHandle)> {
        Self::with_clock(config, transceiver, MonotonicClock, deliveries)
    }
}

impl<T: Transceiver, C: Clock> LinkDriver<T, C> {
    /// Creates a driver reading time from `clock`
    pub fn with_clock(
        config: NodeConfig,
        transceiver: T,
        clock: C,
        deliveries: mpsc::Sender<Delivery>,
    ) -> Result<(Self, DriverHandle)> {
        let station = Station::new(config, transceiver, clock.now())?;
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let driver = LinkDriver {
            station,
            clock,
            tick: DEFAULT_TICK,
            commands: rx,
            deliveries,
        };
        Ok((driver, DriverHandle { commands: tx }))
    }

    /// Overrides the scheduling period
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Runs until every handle is dropped or the line fails
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let station = self.station.node().config().station;
        info!(station, tick = ?self.tick, "link driver started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    if let Err(e) = self.station.tick(now) {
                        error!(station, error = %e, "line failure, link driver stopping");
                        return Err(e);
                    }
                    self.forward_deliveries();
                    self.log_events();
                }

                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.handle(command);
                        self.log_events();
                    }
                    None => {
                        info!(station, "all handles dropped, link driver stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Send { outbound, ack } => {
                let _ = ack.send(self.station.enqueue(outbound));
            }
            Command::Reply { payload, ack } => {
                let _ = ack.send(self.station.reply(now, payload));
            }
            Command::Decline { ack } => {
                let _ = ack.send(self.station.decline(now));
            }
            Command::Status { ack } => {
                let _ = ack.send(self.station.status(now));
            }
            Command::Reset { ack } => {
                self.station.reset(now);
                let _ = ack.send(());
            }
        }
    }

    fn forward_deliveries(&mut self) {
        loop {
            let permit = match self.deliveries.try_reserve() {
                Ok(permit) => permit,
                Err(_) => return,
            };
            match self.station.next_delivery() {
                Some(delivery) => permit.send(delivery),
                None => return,
            }
        }
    }

    fn log_events(&mut self) {
        let station = self.station.node().config().station;
        for event in self.station.drain_events() {
            match event {
                RingEvent::StateChanged { from, to } => trace!(station, %from, %to, "state changed"),
                RingEvent::TokenReceived { from } => trace!(station, from, "token received"),
                RingEvent::TokenPassed { to } => trace!(station, to, "token passed"),
                RingEvent::PollSent { to } => trace!(station, to, "poll for master sent"),
                RingEvent::PollAnswered { poller } => debug!(station, poller, "answered poll for master"),
                RingEvent::MasterFound { station: found } => info!(station, found, "master found"),
                RingEvent::SoleMaster => info!(station, "sole master on the segment"),
                RingEvent::PayloadSent { destination, len, expects_reply } => {
                    debug!(station, destination, len, expects_reply, "payload sent")
                }
                RingEvent::PayloadDelivered { source, len, expects_reply } => {
                    debug!(station, source, len, expects_reply, "payload received")
                }
                RingEvent::TestAnswered { requester } => debug!(station, requester, "test request echoed"),
                RingEvent::ReplySent { requester, postponed } => {
                    debug!(station, requester, postponed, "request answered")
                }
                RingEvent::Fault { state, fault, recovery } => match fault {
                    Fault::TokenLost
                    | Fault::SuccessorLost
                    | Fault::DiscoveryStalled
                    | Fault::InboundOverflow => {
                        warn!(station, %state, ?fault, ?recovery, "ring fault")
                    }
                    _ => debug!(station, %state, ?fault, ?recovery, "ring fault"),
                },
                RingEvent::Reset => info!(station, "node reset"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::bus::SimulatedBus;
    use crate::protocol::MasterState;
    use tokio_test::{assert_err, assert_ok};

    fn config(station: u8) -> NodeConfig {
        NodeConfig {
            station,
            max_master: 3,
            ..NodeConfig::for_station(station)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drivers_exchange_payload() {
        let bus = SimulatedBus::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let (driver1, handle1) = LinkDriver::new(config(1), bus.attach(), tx1).unwrap();
        let (driver2, handle2) = LinkDriver::new(config(2), bus.attach(), tx2).unwrap();
        let task1 = tokio::spawn(driver1.run());
        let task2 = tokio::spawn(driver2.run());

        handle2
            .send(Outbound::new(Bytes::from_static(b"ping"), 1, false))
            .await
            .unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(5), rx1.recv())
            .await
            .expect("payload within five seconds")
            .unwrap();
        assert_eq!(delivery.source, 2);
        assert_eq!(&delivery.payload[..], b"ping");

        let status = handle1.status().await.unwrap();
        assert_eq!(status.station, 1);
        assert_eq!(status.next_station, 2);

        assert_ok!(handle1.reset().await);
        assert_eq!(handle1.status().await.unwrap().state, MasterState::Initialize);

        drop(handle1);
        drop(handle2);
        assert!(task1.await.unwrap().is_ok());
        assert!(task2.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_without_request_is_rejected() {
        let bus = SimulatedBus::new();
        let (tx, _rx) = mpsc::channel(1);
        let (driver, handle) = LinkDriver::new(config(1), bus.attach(), tx).unwrap();
        let task = tokio::spawn(driver.with_tick(Duration::from_millis(2)).run());

        let err = assert_err!(handle.reply(&b"late"[..]).await);
        assert!(matches!(err, Error::InvalidState(_)));
        let err = assert_err!(handle.decline().await);
        assert!(matches!(err, Error::InvalidState(_)));

        drop(handle);
        assert_ok!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_handle_reports_closed_driver() {
        let bus = SimulatedBus::new();
        let (tx, _rx) = mpsc::channel(1);
        let (driver, handle) = LinkDriver::new(config(1), bus.attach(), tx).unwrap();
        drop(driver);

        let err = assert_err!(handle.status().await);
        assert!(matches!(err, Error::Closed));
    }
}
