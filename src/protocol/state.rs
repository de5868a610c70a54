use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;

use crate::core::{Error, NodeConfig, OverflowPolicy, QueueKind, Result, MAX_MASTER_ADDRESS};
use crate::time::{util as time_util, Timer};
use super::frame::{Frame, FrameType, Received};
use super::queue::{BoundedQueue, Delivery, Outbound};
use super::recovery::{classify, Fault, Recovery, RingStats};

/// Events kept between two drains before older ones are discarded
const MAX_PENDING_EVENTS: usize = 1024;

/// Current state of the master node state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MasterState {
    /// Letting the line settle after startup or reset
    Initialize,
    /// Listening for the token or a request
    Idle,
    /// Holding the token and draining the outbound queue
    UseToken,
    /// Waiting for the answer to a request we just sent
    WaitForReply,
    /// Deciding whether to poll or pass the token
    DoneWithToken,
    /// Handing the token to the next station
    PassToken,
    /// Token presumed lost, waiting for our regeneration slot
    NoToken,
    /// Probing addresses for another master
    PollForMaster,
    /// Waiting for the upper layer to answer a request addressed to us
    AnswerDataRequest,
}

impl MasterState {
    pub fn name(self) -> &'static str {
        match self {
            MasterState::Initialize => "Initialize",
            MasterState::Idle => "Idle",
            MasterState::UseToken => "UseToken",
            MasterState::WaitForReply => "WaitForReply",
            MasterState::DoneWithToken => "DoneWithToken",
            MasterState::PassToken => "PassToken",
            MasterState::NoToken => "NoToken",
            MasterState::PollForMaster => "PollForMaster",
            MasterState::AnswerDataRequest => "AnswerDataRequest",
        }
    }

    /// Whether this station owns the line in this state
    pub fn holds_token(self) -> bool {
        matches!(
            self,
            MasterState::UseToken
                | MasterState::WaitForReply
                | MasterState::DoneWithToken
                | MasterState::PassToken
                | MasterState::PollForMaster
        )
    }
}

impl fmt::Display for MasterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a poll-for-master sweep was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SweepKind {
    /// Periodic probe of the gap up to the current successor
    Maintenance,
    /// Probe of every other address after the token was lost
    Regeneration,
    /// Probe of the addresses after a successor that stopped answering
    Successor,
}

/// Token passed to a successor that has not been heard from yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub to: u8,
    pub retried: bool,
}

/// An address sweep in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub kind: SweepKind,
    /// First address not probed; the sweep ends on reaching it
    pub stop: u8,
}

/// Event fed into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing arrived; only timers are checked
    Tick,
    /// Octets arrived on the line
    LineActivity,
    /// A frame with a valid header arrived
    Frame(Received),
    /// A partial frame was dropped after the line went silent
    FrameAborted,
}

impl From<Received> for Input {
    fn from(received: Received) -> Self {
        Input::Frame(received)
    }
}

/// Where the engine puts frames it transmits
///
/// `transmit` returns before the engine records anything about the frame,
/// so counters and events for a transmission always come after it.
pub trait FrameSink {
    fn transmit(&mut self, now: Instant, frame: &Frame) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn transmit(&mut self, _now: Instant, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Something the engine did, recorded for the scheduler to log later
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingEvent {
    StateChanged { from: MasterState, to: MasterState },
    TokenReceived { from: u8 },
    TokenPassed { to: u8 },
    PollSent { to: u8 },
    PollAnswered { poller: u8 },
    MasterFound { station: u8 },
    SoleMaster,
    PayloadSent { destination: u8, len: usize, expects_reply: bool },
    PayloadDelivered { source: u8, len: usize, expects_reply: bool },
    TestAnswered { requester: u8 },
    ReplySent { requester: u8, postponed: bool },
    Fault { state: MasterState, fault: Fault, recovery: Recovery },
    Reset,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timers {
    /// Restarted by every octet on the line and every own transmission
    silence: Timer,
    usage: Timer,
    reply_delay: Timer,
    sweep: Timer,
    handoff: Timer,
}

/// Mutable runtime record of the ring as seen by this station
#[derive(Debug, Clone)]
pub struct RingState {
    state: MasterState,
    entered: Instant,
    token_count: u32,
    frame_count: u8,
    next_station: u8,
    poll_station: u8,
    sole_master: bool,
    sweep: Option<Sweep>,
    handoff: Option<Handoff>,
    requester: Option<u8>,
    masters: u128,
    last_token: Option<Instant>,
    rotation: Option<Duration>,
    rotation_min: Option<Duration>,
    rotation_max: Option<Duration>,
    timers: Timers,
}

impl RingState {
    fn new(config: &NodeConfig, now: Instant) -> Self {
        let mut timers = Timers::default();
        timers.silence.arm(now);
        RingState {
            state: MasterState::Initialize,
            entered: now,
            token_count: 0,
            frame_count: 0,
            next_station: config.successor(config.station),
            poll_station: config.successor(config.station),
            sole_master: false,
            sweep: None,
            handoff: None,
            requester: None,
            masters: 0,
            last_token: None,
            rotation: None,
            rotation_min: None,
            rotation_max: None,
            timers,
        }
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    /// Token rotations since the last maintenance sweep
    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    /// Payload frames sent during the current hold
    pub fn frame_count(&self) -> u8 {
        self.frame_count
    }

    pub fn next_station(&self) -> u8 {
        self.next_station
    }

    /// Address most recently probed
    pub fn poll_station(&self) -> u8 {
        self.poll_station
    }

    pub fn sole_master(&self) -> bool {
        self.sole_master
    }

    pub fn sweep(&self) -> Option<Sweep> {
        self.sweep
    }

    /// Pass awaiting proof that the successor took the token
    pub fn handoff(&self) -> Option<Handoff> {
        self.handoff
    }

    /// Station whose request is waiting for our answer
    pub fn requester(&self) -> Option<u8> {
        self.requester
    }

    /// Time between the last two tokens received
    pub fn rotation(&self) -> Option<Duration> {
        self.rotation
    }

    /// Shortest and longest rotation seen since the last reset
    pub fn rotation_bounds(&self) -> Option<(Duration, Duration)> {
        self.rotation_min.zip(self.rotation_max)
    }

    fn note_rotation(&mut self, rotation: Duration) {
        self.rotation = Some(rotation);
        self.rotation_min = Some(self.rotation_min.map_or(rotation, |min| min.min(rotation)));
        self.rotation_max = Some(self.rotation_max.map_or(rotation, |max| max.max(rotation)));
    }

    /// Addresses heard sending master-only frames
    pub fn masters(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_MASTER_ADDRESS).filter(move |&addr| self.masters & (1u128 << addr) != 0)
    }

    fn note_master(&mut self, address: u8) {
        if address <= MAX_MASTER_ADDRESS {
            self.masters |= 1u128 << address;
        }
    }
}

/// Point-in-time summary of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub station: u8,
    pub state: MasterState,
    #[serde(serialize_with = "crate::core::serde::serialize_millis")]
    pub time_in_state: Duration,
    pub next_station: u8,
    pub poll_station: u8,
    pub sole_master: bool,
    pub token_count: u32,
    pub outbound_len: usize,
    pub inbound_len: usize,
    pub master_count: u32,
    pub rotation_ms: Option<u64>,
    pub rotation_min_ms: Option<u64>,
    pub rotation_max_ms: Option<u64>,
    pub stats: RingStats,
}

enum Flow {
    Continue,
    Wait,
}

/// Master node engine
///
/// The engine is a plain value advanced by [`step`](MasterNode::step). It
/// never reads a clock, never blocks and never logs: the caller supplies
/// the current instant and a [`FrameSink`], and drains [`RingEvent`]s
/// afterwards.
pub struct MasterNode {
    config: NodeConfig,
    ring: RingState,
    outbound: BoundedQueue<Outbound>,
    inbound: BoundedQueue<Delivery>,
    stats: RingStats,
    events: VecDeque<RingEvent>,
}

impl MasterNode {
    /// Creates a node in INITIALIZE; fails on an invalid configuration
    pub fn new(config: NodeConfig, now: Instant) -> Result<Self> {
        config.validate()?;
        Ok(MasterNode {
            ring: RingState::new(&config, now),
            outbound: BoundedQueue::new(
                QueueKind::Outbound,
                config.outbound_capacity,
                OverflowPolicy::DropNewest,
            ),
            inbound: BoundedQueue::new(
                QueueKind::Inbound,
                config.inbound_capacity,
                config.inbound_overflow,
            ),
            stats: RingStats::default(),
            events: VecDeque::new(),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> MasterState {
        self.ring.state
    }

    pub fn ring(&self) -> &RingState {
        &self.ring
    }

    pub fn stats(&self) -> &RingStats {
        &self.stats
    }

    pub fn status(&self, now: Instant) -> Status {
        Status {
            station: self.config.station,
            state: self.ring.state,
            time_in_state: now.saturating_duration_since(self.ring.entered),
            next_station: self.ring.next_station,
            poll_station: self.ring.poll_station,
            sole_master: self.ring.sole_master,
            token_count: self.ring.token_count,
            outbound_len: self.outbound.len(),
            inbound_len: self.inbound.len(),
            master_count: self.ring.masters.count_ones(),
            rotation_ms: self.ring.rotation.map(time_util::millis),
            rotation_min_ms: self.ring.rotation_min.map(time_util::millis),
            rotation_max_ms: self.ring.rotation_max.map(time_util::millis),
            stats: self.stats,
        }
    }

    /// Queues a payload for the next token hold
    pub fn enqueue(&mut self, outbound: Outbound) -> Result<()> {
        if outbound.payload.len() > self.config.max_payload {
            return Err(Error::protocol(format!(
                "payload of {} octets exceeds {}",
                outbound.payload.len(),
                self.config.max_payload
            )));
        }
        match self.outbound.push(outbound) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.stats.queue_overflows += 1;
                Err(e)
            }
        }
    }

    /// Oldest payload received from the line
    pub fn next_delivery(&mut self) -> Option<Delivery> {
        self.inbound.pop()
    }

    /// Events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<RingEvent> {
        self.events.drain(..).collect()
    }

    /// Returns to INITIALIZE with fresh ring state; queued payloads are kept
    pub fn reset(&mut self, now: Instant) {
        self.ring = RingState::new(&self.config, now);
        self.event(RingEvent::Reset);
    }

    /// Answers the request that put us in ANSWER_DATA_REQUEST
    pub fn submit_reply(
        &mut self,
        now: Instant,
        payload: impl Into<Bytes>,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let requester = self.pending_requester()?;
        let payload = payload.into();
        if payload.len() > self.config.max_payload {
            return Err(Error::protocol(format!(
                "reply of {} octets exceeds {}",
                payload.len(),
                self.config.max_payload
            )));
        }

        let len = payload.len();
        self.send(now, &Frame::data(requester, self.config.station, payload, false), sink)?;
        self.stats.payloads_sent += 1;
        self.finish_answer(now);
        self.event(RingEvent::PayloadSent { destination: requester, len, expects_reply: false });
        self.event(RingEvent::ReplySent { requester, postponed: false });
        Ok(())
    }

    /// Tells the requester its answer will come later
    pub fn decline_reply(&mut self, now: Instant, sink: &mut dyn FrameSink) -> Result<()> {
        let requester = self.pending_requester()?;
        let frame = Frame::new(FrameType::ReplyPostponed, requester, self.config.station, Bytes::new());
        self.send(now, &frame, sink)?;
        self.finish_answer(now);
        self.event(RingEvent::ReplySent { requester, postponed: true });
        Ok(())
    }

    /// Feeds one input and runs every transition it enables
    pub fn step(&mut self, now: Instant, input: Input, sink: &mut dyn FrameSink) -> Result<()> {
        match input {
            Input::Tick => {}
            Input::LineActivity => self.ring.timers.silence.arm(now),
            Input::FrameAborted => {
                self.recover(now, Fault::FrameAborted, sink)?;
            }
            Input::Frame(received) => {
                self.ring.timers.silence.arm(now);
                self.on_frame(now, received, sink)?;
            }
        }
        self.advance(now, sink)
    }

    fn pending_requester(&self) -> Result<u8> {
        match (self.ring.state, self.ring.requester) {
            (MasterState::AnswerDataRequest, Some(requester)) => Ok(requester),
            (state, _) => Err(Error::invalid_state(format!(
                "no request awaiting an answer in {}",
                state
            ))),
        }
    }

    fn finish_answer(&mut self, now: Instant) {
        self.ring.requester = None;
        self.ring.timers.reply_delay.disarm();
        self.enter(now, MasterState::Idle);
    }

    fn event(&mut self, event: RingEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn enter(&mut self, now: Instant, to: MasterState) {
        let from = self.ring.state;
        if from != to {
            self.ring.state = to;
            self.ring.entered = now;
            self.event(RingEvent::StateChanged { from, to });
        }
    }

    fn send(&mut self, now: Instant, frame: &Frame, sink: &mut dyn FrameSink) -> Result<()> {
        sink.transmit(now, frame)?;
        self.ring.timers.silence.arm(now);
        self.stats.frames_sent += 1;
        Ok(())
    }

    fn take_token(&mut self, now: Instant) {
        self.ring.handoff = None;
        self.ring.frame_count = 0;
        self.ring.timers.usage.arm(now);
        self.enter(now, MasterState::UseToken);
    }

    fn recover(&mut self, now: Instant, fault: Fault, sink: &mut dyn FrameSink) -> Result<Recovery> {
        let state = self.ring.state;
        let recovery = classify(state, fault);
        match recovery {
            Recovery::Ignore | Recovery::DropPayload => {}
            Recovery::EndHold => self.enter(now, MasterState::DoneWithToken),
            Recovery::ReturnToIdle => {
                self.ring.sweep = None;
                self.ring.requester = None;
                self.ring.timers.sweep.disarm();
                self.ring.timers.reply_delay.disarm();
                self.enter(now, MasterState::Idle);
            }
            Recovery::PresumeTokenLost => self.enter(now, MasterState::NoToken),
            Recovery::Rediscover => {
                let station = self.config.station;
                let first = self.config.successor(station);
                self.begin_sweep(now, SweepKind::Regeneration, first, station, sink)?;
            }
            Recovery::RetryPass => {
                if let Some(handoff) = self.ring.handoff {
                    self.send(now, &Frame::token(handoff.to, self.config.station), sink)?;
                    self.ring.handoff = Some(Handoff { retried: true, ..handoff });
                    self.ring.timers.handoff.arm(now);
                }
            }
            Recovery::FindSuccessor => {
                if let Some(handoff) = self.ring.handoff.take() {
                    let station = self.config.station;
                    let first = self.config.successor(handoff.to);
                    self.begin_sweep(now, SweepKind::Successor, first, station, sink)?;
                }
            }
        }
        self.stats.record(fault);
        self.event(RingEvent::Fault { state, fault, recovery });
        Ok(recovery)
    }

    fn deliver(
        &mut self,
        now: Instant,
        source: u8,
        payload: Bytes,
        expects_reply: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let len = payload.len();
        let delivery = Delivery { payload, source, expects_reply };
        match self.inbound.push(delivery) {
            Ok(None) => {
                self.stats.payloads_delivered += 1;
                self.event(RingEvent::PayloadDelivered { source, len, expects_reply });
            }
            Ok(Some(_evicted)) => {
                self.stats.payloads_delivered += 1;
                self.event(RingEvent::PayloadDelivered { source, len, expects_reply });
                self.recover(now, Fault::InboundOverflow, sink)?;
            }
            Err(_) => {
                self.recover(now, Fault::InboundOverflow, sink)?;
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, now: Instant, received: Received, sink: &mut dyn FrameSink) -> Result<()> {
        let header = received.header();
        let station = self.config.station;

        // our own transmission echoed back by the transceiver
        if header.source == station {
            return Ok(());
        }
        self.ring.handoff = None;

        if header.frame_type == FrameType::PollForMaster && header.destination == station {
            self.send(now, &Frame::reply_to_poll(header.source, station), sink)?;
            self.stats.polls_answered += 1;
            self.event(RingEvent::PollAnswered { poller: header.source });
        }

        self.stats.frames_received += 1;
        if matches!(
            header.frame_type,
            FrameType::Token | FrameType::PollForMaster | FrameType::ReplyToPollForMaster
        ) {
            self.ring.note_master(header.source);
        }

        match self.ring.state {
            MasterState::Initialize | MasterState::NoToken => {
                self.enter(now, MasterState::Idle);
                self.on_frame_idle(now, received, sink)
            }
            MasterState::Idle => self.on_frame_idle(now, received, sink),
            MasterState::WaitForReply => self.on_frame_waiting(now, received, sink),
            MasterState::PollForMaster => self.on_frame_polling(now, received, sink),
            MasterState::AnswerDataRequest => {
                if header.frame_type == FrameType::PollForMaster && header.destination == station {
                    return Ok(());
                }
                self.recover(now, Fault::UnexpectedFrame(header.frame_type), sink)?;
                self.on_frame_idle(now, received, sink)
            }
            MasterState::UseToken | MasterState::DoneWithToken | MasterState::PassToken => {
                if let Received::CorruptPayload(header) = received {
                    self.recover(now, Fault::CorruptPayload(header.frame_type), sink)?;
                }
                Ok(())
            }
        }
    }

    fn on_frame_idle(&mut self, now: Instant, received: Received, sink: &mut dyn FrameSink) -> Result<()> {
        let station = self.config.station;
        let frame = match received {
            Received::Frame(frame) => frame,
            Received::CorruptPayload(header) => {
                self.recover(now, Fault::CorruptPayload(header.frame_type), sink)?;
                return Ok(());
            }
        };
        let to_us = frame.destination == station;

        match frame.frame_type {
            FrameType::Token if to_us => {
                self.ring.sole_master = false;
                self.take_token(now);
                self.stats.tokens_received += 1;
                if let Some(last) = self.ring.last_token.replace(now) {
                    self.ring.note_rotation(now.saturating_duration_since(last));
                }
                self.event(RingEvent::TokenReceived { from: frame.source });
            }
            FrameType::DataExpectingReply if to_us => {
                self.ring.requester = Some(frame.source);
                self.ring.timers.reply_delay.arm(now);
                self.enter(now, MasterState::AnswerDataRequest);
                self.deliver(now, frame.source, frame.data, true, sink)?;
            }
            FrameType::DataExpectingReply | FrameType::DataNotExpectingReply
                if to_us || frame.is_broadcast() =>
            {
                self.deliver(now, frame.source, frame.data, false, sink)?;
            }
            FrameType::TestRequest if to_us => {
                let echo = Frame::new(FrameType::TestResponse, frame.source, station, frame.data);
                self.send(now, &echo, sink)?;
                self.event(RingEvent::TestAnswered { requester: frame.source });
            }
            _ => {}
        }
        Ok(())
    }

    fn on_frame_waiting(&mut self, now: Instant, received: Received, sink: &mut dyn FrameSink) -> Result<()> {
        let header = received.header();
        if !header.frame_type.may_be_reply() {
            self.recover(now, Fault::UnexpectedFrame(header.frame_type), sink)?;
            return Ok(());
        }
        // traffic between two other stations; the reply may still come
        if header.destination != self.config.station && !header.is_broadcast() {
            return Ok(());
        }

        match received {
            Received::Frame(frame) => {
                self.enter(now, MasterState::DoneWithToken);
                if !frame.data.is_empty() || frame.frame_type.carries_data() {
                    self.deliver(now, frame.source, frame.data, false, sink)?;
                }
            }
            Received::CorruptPayload(header) => {
                self.recover(now, Fault::CorruptPayload(header.frame_type), sink)?;
            }
        }
        Ok(())
    }

    fn on_frame_polling(&mut self, now: Instant, received: Received, sink: &mut dyn FrameSink) -> Result<()> {
        let header = received.header();
        let to_us = header.destination == self.config.station;
        self.ring.sweep = None;
        self.ring.timers.sweep.disarm();

        match header.frame_type {
            FrameType::ReplyToPollForMaster if to_us => {
                self.ring.next_station = header.source;
                self.ring.sole_master = false;
                self.enter(now, MasterState::PassToken);
                self.event(RingEvent::MasterFound { station: header.source });
                Ok(())
            }
            FrameType::PollForMaster if to_us => {
                self.ring.sole_master = false;
                self.enter(now, MasterState::Idle);
                Ok(())
            }
            _ => {
                self.enter(now, MasterState::Idle);
                self.on_frame_idle(now, received, sink)
            }
        }
    }

    fn advance(&mut self, now: Instant, sink: &mut dyn FrameSink) -> Result<()> {
        let limit = self.config.max_info_frames as usize + 8;
        for _ in 0..limit {
            if let Flow::Wait = self.run_state(now, sink)? {
                break;
            }
        }
        Ok(())
    }

    fn run_state(&mut self, now: Instant, sink: &mut dyn FrameSink) -> Result<Flow> {
        let timeouts = self.config.timeouts.clone();
        let station = self.config.station;

        match self.ring.state {
            MasterState::Initialize => {
                if self.ring.timers.silence.expired(now, timeouts.no_token) {
                    self.ring.timers.silence.arm(now);
                    self.enter(now, MasterState::Idle);
                }
                Ok(Flow::Wait)
            }

            MasterState::Idle => {
                if let Some(handoff) = self.ring.handoff {
                    if self.ring.timers.handoff.expired(now, timeouts.usage_timeout) {
                        let fault = if handoff.retried {
                            Fault::SuccessorLost
                        } else {
                            Fault::PassUnanswered
                        };
                        self.recover(now, fault, sink)?;
                        return Ok(Flow::Wait);
                    }
                }
                if self.ring.timers.silence.expired(now, timeouts.no_token) {
                    self.recover(now, Fault::TokenLost, sink)?;
                    return Ok(Flow::Continue);
                }
                Ok(Flow::Wait)
            }

            MasterState::NoToken => {
                let stagger = time_util::scaled(timeouts.slot, station as u32);
                if self.ring.timers.silence.expired(now, timeouts.no_token + stagger) {
                    self.recover(now, Fault::RegenerationDue, sink)?;
                }
                Ok(Flow::Wait)
            }

            MasterState::UseToken => {
                if self.ring.timers.usage.expired(now, timeouts.usage_timeout) {
                    self.recover(now, Fault::UsageExpired, sink)?;
                    return Ok(Flow::Continue);
                }
                if self.ring.frame_count >= self.config.max_info_frames {
                    self.enter(now, MasterState::DoneWithToken);
                    return Ok(Flow::Continue);
                }
                let outbound = match self.outbound.pop() {
                    Some(outbound) => outbound,
                    None => {
                        self.enter(now, MasterState::DoneWithToken);
                        return Ok(Flow::Continue);
                    }
                };

                let len = outbound.payload.len();
                let destination = outbound.destination;
                let frame = Frame::data(destination, station, outbound.payload, outbound.expects_reply);
                let awaits_reply = outbound.expects_reply && !frame.is_broadcast();

                self.send(now, &frame, sink)?;
                self.ring.frame_count += 1;
                self.stats.payloads_sent += 1;
                self.event(RingEvent::PayloadSent {
                    destination,
                    len,
                    expects_reply: outbound.expects_reply,
                });

                if awaits_reply {
                    self.enter(now, MasterState::WaitForReply);
                    return Ok(Flow::Wait);
                }
                Ok(Flow::Continue)
            }

            MasterState::WaitForReply => {
                if self.ring.timers.silence.expired(now, timeouts.reply_timeout) {
                    self.recover(now, Fault::ReplyTimeout, sink)?;
                    return Ok(Flow::Continue);
                }
                Ok(Flow::Wait)
            }

            MasterState::DoneWithToken => {
                let more = self.ring.frame_count < self.config.max_info_frames
                    && !self.outbound.is_empty()
                    && !self.ring.timers.usage.expired(now, timeouts.usage_timeout);
                if more {
                    self.enter(now, MasterState::UseToken);
                    return Ok(Flow::Continue);
                }

                if self.ring.token_count >= self.config.poll_interval as u32 {
                    self.ring.token_count = 0;
                    let stop = if self.ring.sole_master { station } else { self.ring.next_station };
                    let first = self.config.successor(station);
                    self.begin_sweep(now, SweepKind::Maintenance, first, stop, sink)?;
                } else {
                    self.ring.token_count += 1;
                    self.enter(now, MasterState::PassToken);
                }
                Ok(Flow::Continue)
            }

            MasterState::PassToken => {
                let next = self.ring.next_station;
                if next == station {
                    self.take_token(now);
                    return Ok(Flow::Wait);
                }
                self.send(now, &Frame::token(next, station), sink)?;
                self.ring.handoff = Some(Handoff { to: next, retried: false });
                self.ring.timers.handoff.arm(now);
                self.stats.tokens_passed += 1;
                self.enter(now, MasterState::Idle);
                self.event(RingEvent::TokenPassed { to: next });
                Ok(Flow::Wait)
            }

            MasterState::PollForMaster => {
                let guard = timeouts.no_token
                    + time_util::scaled(timeouts.slot, self.config.max_master as u32 + 1);
                if self.ring.timers.sweep.expired(now, guard) {
                    self.recover(now, Fault::DiscoveryStalled, sink)?;
                    return Ok(Flow::Wait);
                }
                if !self.ring.timers.silence.expired(now, timeouts.slot) {
                    return Ok(Flow::Wait);
                }
                let sweep = match self.ring.sweep {
                    Some(sweep) => sweep,
                    None => {
                        self.enter(now, MasterState::Idle);
                        return Ok(Flow::Wait);
                    }
                };
                let candidate = self.config.successor(self.ring.poll_station);
                if candidate != sweep.stop {
                    self.probe(now, candidate, sink)?;
                    return Ok(Flow::Wait);
                }
                self.finish_sweep(now, sweep);
                match self.ring.state {
                    MasterState::PassToken => Ok(Flow::Continue),
                    _ => Ok(Flow::Wait),
                }
            }

            MasterState::AnswerDataRequest => {
                if self.ring.timers.reply_delay.expired(now, timeouts.reply_delay) {
                    self.recover(now, Fault::ReplyWindowMissed, sink)?;
                }
                Ok(Flow::Wait)
            }
        }
    }

    fn begin_sweep(
        &mut self,
        now: Instant,
        kind: SweepKind,
        first: u8,
        stop: u8,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let sweep = Sweep { kind, stop };
        self.ring.sweep = Some(sweep);
        self.ring.handoff = None;
        self.ring.timers.sweep.arm(now);
        self.enter(now, MasterState::PollForMaster);

        if first == stop {
            self.finish_sweep(now, sweep);
            return Ok(());
        }
        self.probe(now, first, sink)
    }

    fn probe(&mut self, now: Instant, address: u8, sink: &mut dyn FrameSink) -> Result<()> {
        self.send(now, &Frame::poll_for_master(address, self.config.station), sink)?;
        self.ring.poll_station = address;
        self.stats.polls_sent += 1;
        self.event(RingEvent::PollSent { to: address });
        Ok(())
    }

    fn finish_sweep(&mut self, now: Instant, sweep: Sweep) {
        let station = self.config.station;
        self.ring.sweep = None;
        self.ring.timers.sweep.disarm();

        if sweep.stop != station {
            self.enter(now, MasterState::PassToken);
            return;
        }

        let promoted = !self.ring.sole_master;
        self.ring.sole_master = true;
        self.ring.next_station = station;
        self.take_token(now);
        if promoted {
            self.stats.sole_master_promotions += 1;
            self.event(RingEvent::SoleMaster);
        }
    }
}
