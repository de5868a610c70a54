//! Fault classification
//!
//! Nothing that arrives on the line or fails to arrive in time is an error
//! in the `Result` sense. Each such condition is a [`Fault`], and
//! [`classify`] maps it, together with the state it was observed in, to the
//! [`Recovery`] the engine applies. Every recovery lands in a live state.

use serde::Serialize;

use super::frame::FrameType;
use super::state::MasterState;

/// Abnormal condition observed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Line went silent in the middle of a frame
    FrameAborted,
    /// Header verified but the payload checksum did not
    CorruptPayload(FrameType),
    /// A frame that cannot be the awaited answer, or was meant for someone else
    UnexpectedFrame(FrameType),
    /// No answer arrived within the reply timeout
    ReplyTimeout,
    /// Token held for longer than the usage timeout
    UsageExpired,
    /// Line silent for the no-token timeout
    TokenLost,
    /// Our slot in the regeneration stagger has arrived
    RegenerationDue,
    /// Discovery ran past its overall limit
    DiscoveryStalled,
    /// Upper layer did not answer a request in time
    ReplyWindowMissed,
    /// Inbound queue full when a payload arrived
    InboundOverflow,
    /// Successor stayed silent after we passed it the token
    PassUnanswered,
    /// Successor stayed silent after the token was passed a second time
    SuccessorLost,
}

/// What the engine does about a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Count it and carry on in the current state
    Ignore,
    /// Discard the payload, keep any header-driven transition
    DropPayload,
    /// Give up the current exchange and go to DONE_WITH_TOKEN
    EndHold,
    /// Abandon whatever was in progress and listen
    ReturnToIdle,
    /// Enter NO_TOKEN and wait for our regeneration slot
    PresumeTokenLost,
    /// Start a regeneration sweep
    Rediscover,
    /// Send the token to the same successor once more
    RetryPass,
    /// Sweep the addresses after the silent successor for a new one
    FindSuccessor,
}

/// Maps a fault observed in `state` to its recovery
pub fn classify(state: MasterState, fault: Fault) -> Recovery {
    use MasterState::*;

    match (state, fault) {
        (WaitForReply, Fault::FrameAborted)
        | (WaitForReply, Fault::CorruptPayload(_))
        | (WaitForReply, Fault::ReplyTimeout) => Recovery::EndHold,
        (WaitForReply, Fault::UnexpectedFrame(_)) => Recovery::ReturnToIdle,

        (UseToken, Fault::UsageExpired) => Recovery::EndHold,

        (Idle, Fault::TokenLost) => Recovery::PresumeTokenLost,
        (NoToken, Fault::RegenerationDue) => Recovery::Rediscover,

        (PollForMaster, Fault::DiscoveryStalled) => Recovery::ReturnToIdle,
        (AnswerDataRequest, Fault::ReplyWindowMissed) => Recovery::ReturnToIdle,
        (AnswerDataRequest, Fault::UnexpectedFrame(_)) => Recovery::ReturnToIdle,

        (Idle, Fault::PassUnanswered) => Recovery::RetryPass,
        (Idle, Fault::SuccessorLost) => Recovery::FindSuccessor,

        (_, Fault::CorruptPayload(_)) | (_, Fault::InboundOverflow) => Recovery::DropPayload,

        _ => Recovery::Ignore,
    }
}

/// Ring activity and anomaly counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub tokens_received: u64,
    pub tokens_passed: u64,
    pub polls_sent: u64,
    /// Polls addressed to us that we answered
    pub polls_answered: u64,
    pub payloads_sent: u64,
    pub payloads_delivered: u64,
    pub reply_timeouts: u64,
    /// Frames that ended a reply wait without being the reply
    pub unexpected_frames: u64,
    /// Payloads discarded for a bad checksum
    pub discarded_payloads: u64,
    pub aborted_frames: u64,
    pub usage_timeouts: u64,
    pub token_losses: u64,
    pub stalled_sweeps: u64,
    pub missed_replies: u64,
    pub queue_overflows: u64,
    pub pass_retries: u64,
    /// Successors given up on after two unanswered passes
    pub successor_losses: u64,
    pub sole_master_promotions: u64,
}

impl RingStats {
    /// Counts a fault
    pub fn record(&mut self, fault: Fault) {
        match fault {
            Fault::FrameAborted => self.aborted_frames += 1,
            Fault::CorruptPayload(_) => self.discarded_payloads += 1,
            Fault::UnexpectedFrame(_) => self.unexpected_frames += 1,
            Fault::ReplyTimeout => self.reply_timeouts += 1,
            Fault::UsageExpired => self.usage_timeouts += 1,
            Fault::TokenLost => self.token_losses += 1,
            Fault::RegenerationDue => {}
            Fault::DiscoveryStalled => self.stalled_sweeps += 1,
            Fault::ReplyWindowMissed => self.missed_replies += 1,
            Fault::InboundOverflow => self.queue_overflows += 1,
            Fault::PassUnanswered => self.pass_retries += 1,
            Fault::SuccessorLost => self.successor_losses += 1,
        }
    }

    /// Sum of all anomaly counters
    pub fn anomalies(&self) -> u64 {
        self.reply_timeouts
            + self.unexpected_frames
            + self.discarded_payloads
            + self.aborted_frames
            + self.usage_timeouts
            + self.token_losses
            + self.stalled_sweeps
            + self.missed_replies
            + self.queue_overflows
            + self.pass_retries
            + self.successor_losses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [MasterState; 9] = [
        MasterState::Initialize,
        MasterState::Idle,
        MasterState::UseToken,
        MasterState::WaitForReply,
        MasterState::DoneWithToken,
        MasterState::PassToken,
        MasterState::NoToken,
        MasterState::PollForMaster,
        MasterState::AnswerDataRequest,
    ];

    #[test]
    fn test_wait_for_reply_faults() {
        let state = MasterState::WaitForReply;
        assert_eq!(classify(state, Fault::ReplyTimeout), Recovery::EndHold);
        assert_eq!(classify(state, Fault::FrameAborted), Recovery::EndHold);
        assert_eq!(
            classify(state, Fault::CorruptPayload(FrameType::DataNotExpectingReply)),
            Recovery::EndHold
        );
        assert_eq!(
            classify(state, Fault::UnexpectedFrame(FrameType::Token)),
            Recovery::ReturnToIdle
        );
    }

    #[test]
    fn test_token_loss_never_resumes_holding() {
        for state in ALL_STATES {
            let recovery = classify(state, Fault::TokenLost);
            assert!(matches!(
                recovery,
                Recovery::Ignore | Recovery::ReturnToIdle | Recovery::PresumeTokenLost
            ));
        }
        assert_eq!(classify(MasterState::Idle, Fault::TokenLost), Recovery::PresumeTokenLost);
        assert_eq!(
            classify(MasterState::NoToken, Fault::RegenerationDue),
            Recovery::Rediscover
        );
    }

    #[test]
    fn test_corrupt_payload_outside_reply_wait_only_drops() {
        for state in ALL_STATES {
            if state == MasterState::WaitForReply {
                continue;
            }
            assert_eq!(
                classify(state, Fault::CorruptPayload(FrameType::DataExpectingReply)),
                Recovery::DropPayload
            );
        }
    }

    #[test]
    fn test_silent_successor_escalates() {
        assert_eq!(classify(MasterState::Idle, Fault::PassUnanswered), Recovery::RetryPass);
        assert_eq!(classify(MasterState::Idle, Fault::SuccessorLost), Recovery::FindSuccessor);
        assert_eq!(classify(MasterState::UseToken, Fault::PassUnanswered), Recovery::Ignore);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = RingStats::default();
        stats.record(Fault::UnexpectedFrame(FrameType::PollForMaster));
        stats.record(Fault::ReplyTimeout);
        stats.record(Fault::RegenerationDue);
        assert_eq!(stats.unexpected_frames, 1);
        assert_eq!(stats.reply_timeouts, 1);
        assert_eq!(stats.anomalies(), 2);
    }
}
