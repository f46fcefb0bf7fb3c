//! Typed events emitted on the multi-agent SSE stream.

use serde::Serialize;

use crate::artifact::{
    CriticReview, ExpertAnswer, ModeratorInit, ModeratorSynthesis, TerminationReason,
};

/// Which role a `phase_start` announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Expert,
    Critic,
    Moderator,
}

/// One event on the debate stream, tagged by `type` on the wire.
///
/// Ordering within a request is strict: `moderator_init`, then per
/// iteration `phase_start`/artifact triples closed by `iteration_complete`,
/// then exactly one `done` — or one `error` when the run aborts.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    ModeratorInit {
        analysis: ModeratorInit,
        was_direct_answer: bool,
    },
    PhaseStart {
        phase: Phase,
        iteration: u32,
    },
    ExpertAnswer {
        iteration: u32,
        answer: ExpertAnswer,
    },
    CriticReview {
        iteration: u32,
        review: CriticReview,
    },
    ModeratorSynthesize {
        iteration: u32,
        synthesis: ModeratorSynthesis,
    },
    IterationComplete {
        iteration: u32,
        overall_score: f64,
    },
    Done {
        final_answer: String,
        termination_reason: TerminationReason,
        total_iterations: u32,
        was_direct_answer: bool,
    },
    Error {
        kind: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_type_discriminator() {
        let event = DebateEvent::PhaseStart {
            phase: Phase::Expert,
            iteration: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_start");
        assert_eq!(json["phase"], "expert");
        assert_eq!(json["iteration"], 1);
    }

    #[test]
    fn done_event_serializes_reason_string() {
        let event = DebateEvent::Done {
            final_answer: "4".to_string(),
            termination_reason: TerminationReason::ExplicitPass,
            total_iterations: 1,
            was_direct_answer: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["termination_reason"], "explicit_pass");
        assert_eq!(json["total_iterations"], 1);
    }

    #[test]
    fn error_event_shape() {
        let event = DebateEvent::Error {
            kind: "storage".to_string(),
            message: "disk full".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "storage");
    }
}
