//! End-to-end orchestrator runs against scripted providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agora_core::types::{MessageType, Role};
use agora_debate::artifact::TerminationReason;
use agora_debate::events::DebateEvent;
use agora_debate::orchestrator::{DebateOutcome, DebateTimeouts, Orchestrator, RoleBinding};
use agora_debate::state::{DebateState, RoleModels, RoleThinking};
use agora_debate::DebateError;
use agora_provider::provider::{ChatRequest, LlmProvider, ProviderError};
use agora_provider::stream::StreamEvent;
use agora_store::{ConversationStore, NewMessage};

enum Script {
    Reply(String),
    Fail(ProviderError),
}

/// Provider that plays back a fixed list of replies, one per call.
struct ScriptedProvider {
    name: &'static str,
    script: Mutex<VecDeque<Script>>,
}

impl ScriptedProvider {
    fn new(name: &'static str, script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn stream_chat(
        &self,
        _req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        _cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("{} called more times than scripted", self.name));
        match next {
            Script::Reply(text) => {
                // Two chunks, to exercise concatenation.
                let mid = text.len() / 2;
                let (a, b) = text.split_at(mid);
                let _ = tx
                    .send(StreamEvent::Text {
                        text: a.to_string(),
                    })
                    .await;
                let _ = tx
                    .send(StreamEvent::Text {
                        text: b.to_string(),
                    })
                    .await;
                let _ = tx.send(StreamEvent::End { usage: None }).await;
                Ok(())
            }
            Script::Fail(err) => Err(err),
        }
    }
}

// ── Scripted reply builders ──────────────────────────────────────────────────

fn init_delegate() -> Script {
    Script::Reply(
        serde_json::json!({
            "intent": "answer the question",
            "key_constraints": [],
            "complexity": "moderate",
            "complexity_reason": "needs expertise",
            "decision": "delegate_expert"
        })
        .to_string(),
    )
}

fn init_direct(answer: &str) -> Script {
    Script::Reply(
        serde_json::json!({
            "intent": "trivial lookup",
            "key_constraints": [],
            "complexity": "simple",
            "complexity_reason": "arithmetic",
            "decision": "direct_answer",
            "direct_answer": answer
        })
        .to_string(),
    )
}

fn expert(conclusion: &str) -> Script {
    Script::Reply(
        serde_json::json!({
            "understanding": "the question",
            "core_points": ["a point"],
            "details": "full explanation",
            "conclusion": conclusion,
            "confidence": 0.8
        })
        .to_string(),
    )
}

fn critic(score: f64, passed: bool) -> Script {
    Script::Reply(
        serde_json::json!({
            "overall_score": score,
            "passed": passed,
            "issues": [],
            "strengths": ["clear"],
            "suggestions": ["expand"]
        })
        .to_string(),
    )
}

fn synthesis(decision: &str, summary: &str) -> Script {
    Script::Reply(
        serde_json::json!({
            "feedback_validation": {"valid_issues": [], "invalid_issues": []},
            "decision": decision,
            "improvement_guidance": "go deeper",
            "iteration_summary": summary
        })
        .to_string(),
    )
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<ConversationStore>,
    orchestrator: Orchestrator,
    state: DebateState,
}

fn binding(model_id: &str, provider: Arc<dyn LlmProvider>) -> RoleBinding {
    RoleBinding {
        model_id: model_id.to_string(),
        provider,
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
        thinking_requested: false,
    }
}

fn harness(
    moderator: Vec<Script>,
    expert_script: Vec<Script>,
    critic_script: Vec<Script>,
    max_iterations: u32,
    score_threshold: f64,
) -> Harness {
    let store = Arc::new(ConversationStore::in_memory().unwrap());
    store.create_or_touch("conv", Some("expert-model")).unwrap();
    store
        .append_message(
            "conv",
            Role::User,
            "What is the best sorting algorithm?",
            NewMessage {
                message_type: Some(MessageType::User),
                ..Default::default()
            },
        )
        .unwrap();

    let state = DebateState {
        models: RoleModels {
            moderator: "moderator-model".to_string(),
            expert: "expert-model".to_string(),
            critic: "critic-model".to_string(),
        },
        max_iterations,
        score_threshold,
        thinking: RoleThinking::default(),
        iterations: Vec::new(),
        conversation_context: String::new(),
        active: true,
    };

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        binding(
            "moderator-model",
            ScriptedProvider::new("moderator", moderator),
        ),
        binding("expert-model", ScriptedProvider::new("expert", expert_script)),
        binding("critic-model", ScriptedProvider::new("critic", critic_script)),
        DebateTimeouts::default(),
    );

    Harness {
        store,
        orchestrator,
        state,
    }
}

async fn run(mut h: Harness) -> (Vec<DebateEvent>, Result<DebateOutcome, DebateError>, Harness) {
    let (tx, mut rx) = mpsc::channel::<DebateEvent>(256);
    let cancel = CancellationToken::new();
    let result = h
        .orchestrator
        .run(
            "conv",
            "What is the best sorting algorithm?",
            &mut h.state,
            &tx,
            &cancel,
        )
        .await;
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (events, result, h)
}

fn event_types(events: &[DebateEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            serde_json::to_value(e).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_round_pass_emits_the_full_ordered_sequence() {
    let h = harness(
        vec![init_delegate(), synthesis("continue", "solid round")],
        vec![expert("quicksort, usually")],
        vec![critic(85.0, true)],
        3,
        80.0,
    );
    let (events, result, _) = run(h).await;

    assert_eq!(
        event_types(&events),
        vec![
            "moderator_init",
            "phase_start",
            "expert_answer",
            "phase_start",
            "critic_review",
            "phase_start",
            "moderator_synthesize",
            "iteration_complete",
            "done",
        ]
    );

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::ExplicitPass);
    assert_eq!(outcome.total_iterations, 1);
    assert!(!outcome.was_direct_answer);
}

#[tokio::test]
async fn score_threshold_terminates_after_second_round() {
    let h = harness(
        vec![
            init_delegate(),
            synthesis("continue", "needs work"),
            synthesis("continue", "much better"),
        ],
        vec![expert("first attempt"), expert("second attempt")],
        vec![critic(72.0, false), critic(81.0, false)],
        3,
        80.0,
    );
    let (events, result, _) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::ScoreThreshold);
    assert_eq!(outcome.total_iterations, 2);

    // Round 1 events all precede round 2 events.
    let iterations: Vec<u32> = events
        .iter()
        .filter_map(|e| serde_json::to_value(e).unwrap()["iteration"].as_u64())
        .map(|i| i as u32)
        .collect();
    let mut sorted = iterations.clone();
    sorted.sort_unstable();
    assert_eq!(iterations, sorted);
}

#[tokio::test]
async fn max_iterations_terminates_a_stubborn_debate() {
    let h = harness(
        vec![
            init_delegate(),
            synthesis("continue", "round 1"),
            synthesis("continue", "round 2"),
            synthesis("continue", "round 3"),
        ],
        vec![expert("try one"), expert("try two"), expert("try three")],
        vec![critic(60.0, false), critic(65.0, false), critic(70.0, false)],
        3,
        80.0,
    );
    let (_, result, h) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::MaxIterations);
    assert_eq!(outcome.total_iterations, 3);
    // Best round (70) supplies the answer body.
    assert!(outcome.final_answer.contains("try three"));

    let state_value = h.store.read_debate_state("conv").unwrap().unwrap();
    let state = DebateState::from_value(&state_value).unwrap();
    assert_eq!(state.iterations.len(), 3);
}

#[tokio::test]
async fn single_iteration_budget_with_failing_critic() {
    let h = harness(
        vec![init_delegate(), synthesis("continue", "not there yet")],
        vec![expert("only attempt")],
        vec![critic(40.0, false)],
        1,
        80.0,
    );
    let (_, result, _) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::MaxIterations);
    assert_eq!(outcome.total_iterations, 1);
}

#[tokio::test]
async fn direct_answer_skips_the_debate_entirely() {
    let h = harness(vec![init_direct("4")], vec![], vec![], 3, 80.0);
    let (events, result, h) = run(h).await;

    assert_eq!(event_types(&events), vec!["moderator_init", "done"]);

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::SimpleQuestion);
    assert_eq!(outcome.final_answer, "4");
    assert!(outcome.was_direct_answer);

    // user message + init artifact + final answer
    let messages = h.store.load_messages("conv").unwrap();
    assert_eq!(messages.len(), 3);
    let conv = h.store.get("conv").unwrap().unwrap();
    assert_eq!(conv.message_count as usize, messages.len());
    assert_eq!(
        messages.last().unwrap().message_type,
        Some(MessageType::FinalAnswer)
    );
    assert_eq!(messages.last().unwrap().content, "4");
}

#[tokio::test]
async fn expert_auth_failure_becomes_a_failing_round_and_debate_continues() {
    let h = harness(
        vec![
            init_delegate(),
            synthesis("continue", "expert was unreadable"),
            synthesis("continue", "recovered"),
        ],
        vec![
            Script::Fail(ProviderError::Auth("401 invalid key".to_string())),
            expert("real answer"),
        ],
        vec![critic(0.0, false), critic(90.0, false)],
        3,
        80.0,
    );
    let (events, result, h) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::ScoreThreshold);
    assert_eq!(outcome.total_iterations, 2);

    // Round 1's expert artifact is the fabricated salvage, not an abort.
    let first_expert = events
        .iter()
        .find_map(|e| match e {
            DebateEvent::ExpertAnswer { iteration: 1, answer } => Some(answer.clone()),
            _ => None,
        })
        .expect("round 1 expert answer event");
    assert_eq!(first_expert.confidence, 0.0);
    assert!(first_expert.details.contains("auth"));

    // The failing round is persisted with its iteration number.
    let messages = h.store.load_messages("conv").unwrap();
    let round1_expert = messages
        .iter()
        .find(|m| m.message_type == Some(MessageType::ExpertAnswer) && m.iteration == Some(1))
        .expect("persisted round 1 expert artifact");
    assert_eq!(round1_expert.role, Role::System);
}

#[tokio::test]
async fn identical_conclusions_with_stalled_score_converge() {
    let h = harness(
        vec![
            init_delegate(),
            synthesis("continue", "round 1"),
            synthesis("continue", "round 2"),
        ],
        vec![expert("the answer is 42"), expert("the  answer is  42")],
        vec![critic(60.0, false), critic(61.0, false)],
        5,
        80.0,
    );
    let (_, result, _) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::Convergence);
    assert_eq!(outcome.total_iterations, 2);
}

#[tokio::test]
async fn moderator_end_verdict_stops_midway() {
    let h = harness(
        vec![init_delegate(), synthesis("end", "good enough")],
        vec![expert("fine answer")],
        vec![critic(75.0, false)],
        3,
        80.0,
    );
    let (_, result, _) = run(h).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::ExplicitPass);
    assert_eq!(outcome.total_iterations, 1);
}

#[tokio::test]
async fn deleted_conversation_aborts_with_storage_error() {
    let h = harness(vec![init_delegate()], vec![], vec![], 3, 80.0);
    h.store.delete("conv").unwrap();

    let (events, result, _) = run(h).await;
    assert!(matches!(result, Err(DebateError::Store(_))));

    let types = event_types(&events);
    assert_eq!(types.iter().filter(|t| *t == "error").count(), 1);
    assert!(!types.contains(&"done".to_string()));
    if let Some(DebateEvent::Error { kind, .. }) =
        events.iter().find(|e| matches!(e, DebateEvent::Error { .. }))
    {
        assert_eq!(kind, "storage");
    }
}

#[tokio::test]
async fn exactly_one_done_and_artifacts_carry_iterations() {
    let h = harness(
        vec![
            init_delegate(),
            synthesis("continue", "round 1"),
            synthesis("continue", "round 2"),
        ],
        vec![expert("alpha"), expert("beta")],
        vec![critic(50.0, false), critic(95.0, false)],
        5,
        80.0,
    );
    let (events, result, h) = run(h).await;
    result.unwrap();

    let types = event_types(&events);
    assert_eq!(types.iter().filter(|t| *t == "done").count(), 1);
    assert_eq!(types.iter().filter(|t| *t == "error").count(), 0);

    let messages = h.store.load_messages("conv").unwrap();
    for msg in &messages {
        if let Some(mt) = msg.message_type {
            if mt.is_round_artifact() {
                assert!(msg.iteration.unwrap() >= 1);
            }
        }
    }
    let conv = h.store.get("conv").unwrap().unwrap();
    assert_eq!(conv.message_count as usize, messages.len());

    // Context now carries the finished turn for the next one.
    let state = DebateState::from_value(&h.store.read_debate_state("conv").unwrap().unwrap())
        .unwrap();
    assert!(state
        .conversation_context
        .contains("What is the best sorting algorithm?"));
}
