//! Structured role outputs.
//!
//! Each role is asked to reply with JSON matching one of these schemas; the
//! parser validates at the boundary so the orchestrator only ever sees
//! well-formed artifacts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitDecision {
    DirectAnswer,
    DelegateExpert,
}

/// Moderator's opening analysis of the user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorInit {
    pub intent: String,
    pub key_constraints: Vec<String>,
    pub complexity: Complexity,
    pub complexity_reason: String,
    pub decision: InitDecision,
    /// Required iff `decision` is `direct_answer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_answer: Option<String>,
}

/// Expert's full structured answer for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertAnswer {
    pub understanding: String,
    pub core_points: Vec<String>,
    pub details: String,
    pub conclusion: String,
    /// 0..1, clamped by the parser.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Factual,
    Logical,
    Completeness,
    Clarity,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// Critic's scored review of the current expert answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticReview {
    /// 0..100, clamped by the parser.
    pub overall_score: f64,
    pub passed: bool,
    pub issues: Vec<Issue>,
    pub strengths: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackValidation {
    #[serde(default)]
    pub valid_issues: Vec<String>,
    #[serde(default)]
    pub invalid_issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthDecision {
    End,
    Continue,
}

/// Why a debate terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ScoreThreshold,
    ExplicitPass,
    MaxIterations,
    Convergence,
    SimpleQuestion,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::ScoreThreshold => "score_threshold",
            TerminationReason::ExplicitPass => "explicit_pass",
            TerminationReason::MaxIterations => "max_iterations",
            TerminationReason::Convergence => "convergence",
            TerminationReason::SimpleQuestion => "simple_question",
        }
    }
}

/// Moderator's end-of-round synthesis and verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorSynthesis {
    pub feedback_validation: FeedbackValidation,
    pub decision: SynthDecision,
    /// Required iff `decision` is `continue`; the parser fills a generic
    /// instruction when the model omitted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_guidance: Option<String>,
    pub iteration_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderator_init_decodes_snake_case_enums() {
        let json = r#"{
            "intent": "explain",
            "key_constraints": ["short"],
            "complexity": "simple",
            "complexity_reason": "arithmetic",
            "decision": "direct_answer",
            "direct_answer": "4"
        }"#;
        let init: ModeratorInit = serde_json::from_str(json).unwrap();
        assert_eq!(init.decision, InitDecision::DirectAnswer);
        assert_eq!(init.complexity, Complexity::Simple);
        assert_eq!(init.direct_answer.as_deref(), Some("4"));
    }

    #[test]
    fn critic_requires_all_fields() {
        let missing_passed = r#"{"overall_score": 80, "issues": [], "strengths": [], "suggestions": []}"#;
        assert!(serde_json::from_str::<CriticReview>(missing_passed).is_err());
    }

    #[test]
    fn issue_rejects_unknown_category() {
        let json = r#"{"category": "stylistic", "severity": "low", "description": "x"}"#;
        assert!(serde_json::from_str::<Issue>(json).is_err());
    }

    #[test]
    fn termination_reason_wire_strings() {
        assert_eq!(
            serde_json::to_string(&TerminationReason::ExplicitPass).unwrap(),
            "\"explicit_pass\""
        );
        assert_eq!(TerminationReason::ScoreThreshold.as_str(), "score_threshold");
    }

    #[test]
    fn synthesis_round_trips() {
        let synth = ModeratorSynthesis {
            feedback_validation: FeedbackValidation {
                valid_issues: vec!["missing example".to_string()],
                invalid_issues: vec![],
            },
            decision: SynthDecision::Continue,
            improvement_guidance: Some("add an example".to_string()),
            iteration_summary: "round 1 fell short".to_string(),
            termination_reason: None,
        };
        let json = serde_json::to_string(&synth).unwrap();
        let back: ModeratorSynthesis = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decision, SynthDecision::Continue);
        assert_eq!(back.improvement_guidance.as_deref(), Some("add an example"));
    }
}
