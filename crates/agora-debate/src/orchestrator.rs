//! The debate state machine.
//!
//! One orchestrator instance serves one in-flight request. Role calls are
//! sequential — each state needs the previous artifact — and every artifact
//! is persisted as it is produced, so a disconnect loses nothing that was
//! already computed.
//!
//! Provider failures and unparseable replies never abort the run: they are
//! folded into failing-round artifacts and the loop continues. Only storage
//! failures (or cancellation) end a debate early.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use agora_core::types::{MessageType, Role};
use agora_provider::provider::{
    ChatMessage, ChatRequest, LlmProvider, ProviderError, Role as WireRole,
};
use agora_provider::registry::ModelCard;
use agora_provider::stream::StreamEvent;
use agora_store::{ConversationStore, NewMessage};

use crate::artifact::{InitDecision, SynthDecision, TerminationReason};
use crate::context::build_conversation_context;
use crate::error::{DebateError, Result};
use crate::events::{DebateEvent, Phase};
use crate::parser;
use crate::prompts;
use crate::state::{DebateState, IterationRecord};

/// A debate role resolved to a concrete adapter plus its capability flags.
#[derive(Clone)]
pub struct RoleBinding {
    pub model_id: String,
    pub provider: Arc<dyn LlmProvider>,
    pub supports_thinking: bool,
    pub thinking_locked: bool,
    pub supports_json_mode: bool,
    pub thinking_requested: bool,
}

impl RoleBinding {
    pub fn new(card: &ModelCard, provider: Arc<dyn LlmProvider>, thinking_requested: bool) -> Self {
        Self {
            model_id: card.model_id.clone(),
            provider,
            supports_thinking: card.supports_thinking,
            thinking_locked: card.thinking_locked,
            supports_json_mode: card.supports_json_mode,
            thinking_requested,
        }
    }

    fn thinking_on(&self) -> bool {
        self.thinking_locked || (self.thinking_requested && self.supports_thinking)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DebateTimeouts {
    /// Budget for a single role call.
    pub role_call: Duration,
    /// Budget for the whole debate run.
    pub whole_debate: Duration,
}

impl Default for DebateTimeouts {
    fn default() -> Self {
        Self {
            role_call: Duration::from_secs(180),
            whole_debate: Duration::from_secs(900),
        }
    }
}

/// What a finished debate produced.
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub final_answer: String,
    pub termination_reason: TerminationReason,
    pub total_iterations: u32,
    pub was_direct_answer: bool,
}

enum RoleCall {
    Reply(String),
    Failed(String),
    Cancelled,
}

pub struct Orchestrator {
    store: Arc<ConversationStore>,
    moderator: RoleBinding,
    expert: RoleBinding,
    critic: RoleBinding,
    timeouts: DebateTimeouts,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        moderator: RoleBinding,
        expert: RoleBinding,
        critic: RoleBinding,
        timeouts: DebateTimeouts,
    ) -> Self {
        Self {
            store,
            moderator,
            expert,
            critic,
            timeouts,
        }
    }

    /// Run one debate turn to completion.
    ///
    /// Emits the typed event sequence on `tx` and returns the outcome.
    /// Exactly one `done` or one `error` is emitted — unless the receiver
    /// is dropped or `cancel` fires, in which case the run stops silently.
    #[instrument(skip_all, fields(conversation_id))]
    pub async fn run(
        &self,
        conversation_id: &str,
        user_message: &str,
        state: &mut DebateState,
        tx: &mpsc::Sender<DebateEvent>,
        cancel: &CancellationToken,
    ) -> Result<DebateOutcome> {
        let deadline = Instant::now() + self.timeouts.whole_debate;
        let context = state.conversation_context.clone();
        state.iterations.clear();

        // ── Moderator opening analysis ───────────────────────────────────────
        let raw = match self
            .call_role(
                &self.moderator,
                prompts::MODERATOR_INIT_SYSTEM,
                prompts::moderator_init_user(user_message, &context),
                deadline,
                cancel,
            )
            .await
        {
            RoleCall::Reply(t) => t,
            RoleCall::Failed(desc) => format!("(moderator call failed: {desc})"),
            RoleCall::Cancelled => return Err(DebateError::Cancelled),
        };
        let init = parser::parse_moderator_init(&raw);

        self.persist_artifact(
            conversation_id,
            MessageType::ModeratorInit,
            None,
            &raw,
            serde_json::to_value(&init)?,
            &self.moderator.model_id,
            tx,
        )
        .await?;

        let was_direct = init.decision == InitDecision::DirectAnswer;
        self.emit(
            tx,
            DebateEvent::ModeratorInit {
                analysis: init.clone(),
                was_direct_answer: was_direct,
            },
        )
        .await?;

        if was_direct {
            let final_answer = init.direct_answer.unwrap_or_default();
            info!("moderator answered directly, skipping debate");
            self.finish(
                conversation_id,
                state,
                &final_answer,
                TerminationReason::SimpleQuestion,
                0,
                true,
                &self.moderator.model_id,
                tx,
            )
            .await?;
            return Ok(DebateOutcome {
                final_answer,
                termination_reason: TerminationReason::SimpleQuestion,
                total_iterations: 0,
                was_direct_answer: true,
            });
        }

        // ── Expert → Critic → Moderator rounds ───────────────────────────────
        let mut reason: Option<TerminationReason> = None;
        let mut iteration: u32 = 0;

        while iteration < state.max_iterations {
            iteration += 1;

            // Expert
            self.emit(
                tx,
                DebateEvent::PhaseStart {
                    phase: Phase::Expert,
                    iteration,
                },
            )
            .await?;
            let prior = state
                .iterations
                .last()
                .map(|rec| (rec.critic.clone(), rec.synthesis.improvement_guidance.clone()));
            let expert_prompt = prompts::expert_user(
                user_message,
                &context,
                iteration,
                prior.as_ref().map(|(review, _)| review),
                prior.as_ref().and_then(|(_, guidance)| guidance.as_deref()),
            );
            let raw = match self
                .call_role(
                    &self.expert,
                    prompts::EXPERT_SYSTEM,
                    expert_prompt,
                    deadline,
                    cancel,
                )
                .await
            {
                RoleCall::Reply(t) => t,
                RoleCall::Failed(desc) => format!("(expert call failed: {desc})"),
                RoleCall::Cancelled => return Err(DebateError::Cancelled),
            };
            let answer = parser::parse_expert_answer(&raw);
            self.persist_artifact(
                conversation_id,
                MessageType::ExpertAnswer,
                Some(iteration),
                &raw,
                serde_json::to_value(&answer)?,
                &self.expert.model_id,
                tx,
            )
            .await?;
            self.emit(
                tx,
                DebateEvent::ExpertAnswer {
                    iteration,
                    answer: answer.clone(),
                },
            )
            .await?;

            // Critic — sees only the current answer, keeping each review local.
            self.emit(
                tx,
                DebateEvent::PhaseStart {
                    phase: Phase::Critic,
                    iteration,
                },
            )
            .await?;
            let raw = match self
                .call_role(
                    &self.critic,
                    prompts::CRITIC_SYSTEM,
                    prompts::critic_user(user_message, &answer),
                    deadline,
                    cancel,
                )
                .await
            {
                RoleCall::Reply(t) => t,
                RoleCall::Failed(desc) => format!("(critic call failed: {desc})"),
                RoleCall::Cancelled => return Err(DebateError::Cancelled),
            };
            let review = parser::parse_critic_review(&raw);
            self.persist_artifact(
                conversation_id,
                MessageType::CriticReview,
                Some(iteration),
                &raw,
                serde_json::to_value(&review)?,
                &self.critic.model_id,
                tx,
            )
            .await?;
            self.emit(
                tx,
                DebateEvent::CriticReview {
                    iteration,
                    review: review.clone(),
                },
            )
            .await?;

            // Moderator synthesis
            self.emit(
                tx,
                DebateEvent::PhaseStart {
                    phase: Phase::Moderator,
                    iteration,
                },
            )
            .await?;
            let raw = match self
                .call_role(
                    &self.moderator,
                    prompts::MODERATOR_SYNTHESIS_SYSTEM,
                    prompts::moderator_synthesis_user(
                        user_message,
                        &answer,
                        &review,
                        iteration,
                        state.max_iterations,
                        state.score_threshold,
                    ),
                    deadline,
                    cancel,
                )
                .await
            {
                RoleCall::Reply(t) => t,
                RoleCall::Failed(desc) => format!("(moderator call failed: {desc})"),
                RoleCall::Cancelled => return Err(DebateError::Cancelled),
            };
            let synthesis = parser::parse_moderator_synthesis(&raw);
            self.persist_artifact(
                conversation_id,
                MessageType::ModeratorSynthesize,
                Some(iteration),
                &raw,
                serde_json::to_value(&synthesis)?,
                &self.moderator.model_id,
                tx,
            )
            .await?;
            self.emit(
                tx,
                DebateEvent::ModeratorSynthesize {
                    iteration,
                    synthesis: synthesis.clone(),
                },
            )
            .await?;

            let score = review.overall_score;
            let decision = synthesis.decision;
            let previous = state
                .iterations
                .last()
                .map(|rec| (rec.expert.conclusion.clone(), rec.overall_score));
            state.iterations.push(IterationRecord {
                iteration,
                expert: answer,
                critic: review,
                synthesis,
                overall_score: score,
                decision,
            });
            let current = state.iterations.last().unwrap();

            self.emit(
                tx,
                DebateEvent::IterationComplete {
                    iteration,
                    overall_score: score,
                },
            )
            .await?;

            reason = evaluate_termination(
                current.critic.passed,
                score,
                &current.expert.conclusion,
                previous
                    .as_ref()
                    .map(|(conclusion, prev_score)| (conclusion.as_str(), *prev_score)),
                current.decision,
                iteration,
                state.max_iterations,
                state.score_threshold,
            );

            if reason.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(iteration, "whole-debate timeout reached, terminating");
                reason = Some(TerminationReason::MaxIterations);
                break;
            }
        }

        let reason = reason.unwrap_or(TerminationReason::MaxIterations);
        let final_answer = assemble_final_answer(&state.iterations);
        debug!(reason = reason.as_str(), iterations = iteration, "debate terminated");
        self.finish(
            conversation_id,
            state,
            &final_answer,
            reason,
            iteration,
            false,
            &self.expert.model_id,
            tx,
        )
        .await?;

        Ok(DebateOutcome {
            final_answer,
            termination_reason: reason,
            total_iterations: iteration,
            was_direct_answer: false,
        })
    }

    /// Invoke one role and collect its full concatenated text.
    ///
    /// Thinking chunks are drained but never included in the reply — the
    /// parser works on answer text only.
    async fn call_role(
        &self,
        role: &RoleBinding,
        system: &str,
        user: String,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> RoleCall {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return RoleCall::Failed("debate time budget exhausted".to_string());
        }
        let budget = remaining.min(self.timeouts.role_call);

        let req = ChatRequest {
            model: role.model_id.clone(),
            messages: vec![
                ChatMessage {
                    role: WireRole::System,
                    content: system.to_string(),
                },
                ChatMessage {
                    role: WireRole::User,
                    content: user,
                },
            ],
            max_tokens: 4096,
            temperature: None,
            thinking_enabled: role.thinking_on(),
            response_format_json: role.supports_json_mode,
        };

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
        let child = cancel.child_token();
        let provider = Arc::clone(&role.provider);
        let stream_cancel = child.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.stream_chat(&req, tx.clone(), stream_cancel).await {
                if !matches!(e, ProviderError::Cancelled) {
                    let _ = tx
                        .send(StreamEvent::Error {
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        let call_deadline = Instant::now() + budget;
        let mut text = String::new();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    child.cancel();
                    return RoleCall::Cancelled;
                }
                ev = tokio::time::timeout_at(call_deadline, rx.recv()) => match ev {
                    Err(_) => {
                        child.cancel();
                        return RoleCall::Failed(format!(
                            "timeout: no reply within {}s",
                            budget.as_secs()
                        ));
                    }
                    Ok(None) => break,
                    Ok(Some(ev)) => ev,
                },
            };
            match event {
                StreamEvent::Text { text: chunk } => text.push_str(&chunk),
                StreamEvent::Thinking { .. } => {}
                StreamEvent::End { .. } => return RoleCall::Reply(text),
                StreamEvent::Error { kind, message } => {
                    warn!(model = %role.model_id, kind = %kind, "role call failed");
                    return RoleCall::Failed(format!("{kind}: {message}"));
                }
            }
        }

        if text.is_empty() {
            RoleCall::Failed("stream closed without a reply".to_string())
        } else {
            RoleCall::Reply(text)
        }
    }

    /// Persist one role artifact: raw reply as content, parsed artifact as
    /// metadata, `system` role with a `message_type` discriminator.
    #[allow(clippy::too_many_arguments)]
    async fn persist_artifact(
        &self,
        conversation_id: &str,
        message_type: MessageType,
        iteration: Option<u32>,
        raw: &str,
        artifact: serde_json::Value,
        model_id: &str,
        tx: &mpsc::Sender<DebateEvent>,
    ) -> Result<()> {
        let result = self.store.append_message(
            conversation_id,
            Role::System,
            raw,
            NewMessage {
                model: Some(model_id.to_string()),
                message_type: Some(message_type),
                iteration,
                metadata: Some(artifact),
            },
        );
        if let Err(e) = result {
            let _ = tx
                .send(DebateEvent::Error {
                    kind: "storage".to_string(),
                    message: e.to_string(),
                })
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Write the final assistant message, refresh the rolling context, and
    /// persist the updated debate state before emitting `done`.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        conversation_id: &str,
        state: &mut DebateState,
        final_answer: &str,
        reason: TerminationReason,
        total_iterations: u32,
        was_direct_answer: bool,
        model_id: &str,
        tx: &mpsc::Sender<DebateEvent>,
    ) -> Result<()> {
        let persisted = self
            .store
            .append_message(
                conversation_id,
                Role::Assistant,
                final_answer,
                NewMessage {
                    model: Some(model_id.to_string()),
                    message_type: Some(MessageType::FinalAnswer),
                    ..Default::default()
                },
            )
            .and_then(|_| self.store.load_messages(conversation_id))
            .and_then(|messages| {
                state.conversation_context = build_conversation_context(&messages);
                state.active = true;
                let value = serde_json::to_value(&*state).map_err(agora_store::StoreError::from)?;
                self.store.write_debate_state(conversation_id, &value)
            });

        if let Err(e) = persisted {
            let _ = tx
                .send(DebateEvent::Error {
                    kind: "storage".to_string(),
                    message: e.to_string(),
                })
                .await;
            return Err(e.into());
        }

        self.emit(
            tx,
            DebateEvent::Done {
                final_answer: final_answer.to_string(),
                termination_reason: reason,
                total_iterations,
                was_direct_answer,
            },
        )
        .await
    }

    /// Forward an event, treating a dropped receiver as cancellation.
    async fn emit(&self, tx: &mpsc::Sender<DebateEvent>, event: DebateEvent) -> Result<()> {
        tx.send(event).await.map_err(|_| DebateError::Cancelled)
    }
}

/// Termination policy in priority order. `None` means run another round.
pub(crate) fn evaluate_termination(
    critic_passed: bool,
    score: f64,
    current_conclusion: &str,
    previous: Option<(&str, f64)>,
    decision: SynthDecision,
    iteration: u32,
    max_iterations: u32,
    score_threshold: f64,
) -> Option<TerminationReason> {
    if critic_passed {
        return Some(TerminationReason::ExplicitPass);
    }
    if score >= score_threshold {
        return Some(TerminationReason::ScoreThreshold);
    }
    if iteration >= max_iterations {
        return Some(TerminationReason::MaxIterations);
    }
    if let Some((prev_conclusion, prev_score)) = previous {
        let converged = normalize_whitespace(current_conclusion)
            == normalize_whitespace(prev_conclusion)
            && score - prev_score < 2.0;
        if converged {
            return Some(TerminationReason::Convergence);
        }
    }
    match decision {
        SynthDecision::End => Some(if iteration >= max_iterations {
            TerminationReason::MaxIterations
        } else {
            TerminationReason::ExplicitPass
        }),
        SynthDecision::Continue => None,
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the final answer from the highest-scoring round, led by the last
/// synthesis summary.
pub(crate) fn assemble_final_answer(iterations: &[IterationRecord]) -> String {
    let Some(best) = iterations.iter().max_by(|a, b| {
        a.overall_score
            .partial_cmp(&b.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return "The debate ended before an answer could be produced.".to_string();
    };

    let mut out = String::new();
    if let Some(last) = iterations.last() {
        let lead = last.synthesis.iteration_summary.trim();
        if !lead.is_empty() {
            out.push_str(lead);
            out.push_str("\n\n");
        }
    }

    let expert = &best.expert;
    if !expert.understanding.trim().is_empty() {
        out.push_str(expert.understanding.trim());
        out.push_str("\n\n");
    }
    if !expert.core_points.is_empty() {
        for point in &expert.core_points {
            out.push_str("- ");
            out.push_str(point);
            out.push('\n');
        }
        out.push('\n');
    }
    if !expert.details.trim().is_empty() {
        out.push_str(expert.details.trim());
        out.push_str("\n\n");
    }
    out.push_str(expert.conclusion.trim());
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{
        CriticReview, ExpertAnswer, FeedbackValidation, ModeratorSynthesis,
    };

    fn record(iteration: u32, score: f64, conclusion: &str, summary: &str) -> IterationRecord {
        IterationRecord {
            iteration,
            expert: ExpertAnswer {
                understanding: format!("understanding {iteration}"),
                core_points: vec![format!("point {iteration}")],
                details: format!("details {iteration}"),
                conclusion: conclusion.to_string(),
                confidence: 0.5,
            },
            critic: CriticReview {
                overall_score: score,
                passed: false,
                issues: Vec::new(),
                strengths: Vec::new(),
                suggestions: Vec::new(),
            },
            synthesis: ModeratorSynthesis {
                feedback_validation: FeedbackValidation::default(),
                decision: SynthDecision::Continue,
                improvement_guidance: Some("improve".to_string()),
                iteration_summary: summary.to_string(),
                termination_reason: None,
            },
            overall_score: score,
            decision: SynthDecision::Continue,
        }
    }

    #[test]
    fn explicit_pass_wins_over_everything() {
        let reason = evaluate_termination(
            true,
            10.0,
            "c",
            None,
            SynthDecision::Continue,
            1,
            3,
            80.0,
        );
        assert_eq!(reason, Some(TerminationReason::ExplicitPass));
    }

    #[test]
    fn score_threshold_beats_max_iterations() {
        let reason = evaluate_termination(
            false,
            85.0,
            "c",
            None,
            SynthDecision::Continue,
            3,
            3,
            80.0,
        );
        assert_eq!(reason, Some(TerminationReason::ScoreThreshold));
    }

    #[test]
    fn max_iterations_fires_even_with_failing_critic() {
        let reason = evaluate_termination(
            false,
            20.0,
            "c",
            None,
            SynthDecision::Continue,
            1,
            1,
            80.0,
        );
        assert_eq!(reason, Some(TerminationReason::MaxIterations));
    }

    #[test]
    fn convergence_needs_equal_conclusion_and_stalled_score() {
        let reason = evaluate_termination(
            false,
            61.0,
            "the  answer\nis 42",
            Some(("the answer is 42", 60.0)),
            SynthDecision::Continue,
            2,
            5,
            80.0,
        );
        assert_eq!(reason, Some(TerminationReason::Convergence));

        // Score improved by >= 2 points: no convergence.
        let reason = evaluate_termination(
            false,
            63.0,
            "the answer is 42",
            Some(("the answer is 42", 60.0)),
            SynthDecision::Continue,
            2,
            5,
            80.0,
        );
        assert_eq!(reason, None);

        // Different conclusion: no convergence.
        let reason = evaluate_termination(
            false,
            61.0,
            "something else",
            Some(("the answer is 42", 60.0)),
            SynthDecision::Continue,
            2,
            5,
            80.0,
        );
        assert_eq!(reason, None);
    }

    #[test]
    fn moderator_end_maps_to_explicit_pass_before_max() {
        let reason = evaluate_termination(
            false,
            50.0,
            "c",
            None,
            SynthDecision::End,
            1,
            3,
            80.0,
        );
        assert_eq!(reason, Some(TerminationReason::ExplicitPass));
    }

    #[test]
    fn moderator_continue_runs_another_round() {
        let reason = evaluate_termination(
            false,
            50.0,
            "c",
            None,
            SynthDecision::Continue,
            1,
            3,
            80.0,
        );
        assert_eq!(reason, None);
    }

    #[test]
    fn final_answer_uses_best_round_with_last_summary_lead() {
        let rounds = vec![
            record(1, 60.0, "first conclusion", "round one summary"),
            record(2, 85.0, "best conclusion", "round two summary"),
            record(3, 70.0, "third conclusion", "final summary"),
        ];
        let answer = assemble_final_answer(&rounds);
        assert!(answer.starts_with("final summary"));
        assert!(answer.contains("understanding 2"));
        assert!(answer.contains("- point 2"));
        assert!(answer.contains("details 2"));
        assert!(answer.ends_with("best conclusion"));
    }

    #[test]
    fn final_answer_with_no_rounds_is_a_note() {
        let answer = assemble_final_answer(&[]);
        assert!(!answer.is_empty());
    }
}
