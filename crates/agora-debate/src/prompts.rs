//! Role-specific prompt composition.
//!
//! Each role gets a fixed system prompt carrying its JSON contract, and a
//! per-call user message assembled from the question, the summarised
//! conversation context, and (for later rounds) the previous round's
//! feedback.

use crate::artifact::{CriticReview, ExpertAnswer};

pub const MODERATOR_INIT_SYSTEM: &str = "\
You are the moderator of an expert review workflow. Analyse the user's \
request and decide whether it needs the full expert/critic cycle or can be \
answered directly.

Choose direct_answer only for trivial questions (simple facts, arithmetic, \
one-line lookups). Everything else is delegated.

Reply with a single JSON object and nothing else:
{
  \"intent\": \"<what the user wants, one sentence>\",
  \"key_constraints\": [\"<constraint>\", ...],
  \"complexity\": \"simple\" | \"moderate\" | \"complex\",
  \"complexity_reason\": \"<one sentence>\",
  \"decision\": \"direct_answer\" | \"delegate_expert\",
  \"direct_answer\": \"<the full answer — required when decision is direct_answer>\"
}";

pub const EXPERT_SYSTEM: &str = "\
You are the domain expert in a moderated review workflow. Produce the most \
accurate, complete answer you can. A critic will score it, so be precise \
and cover the question fully.

Reply with a single JSON object and nothing else:
{
  \"understanding\": \"<your reading of the question, one or two sentences>\",
  \"core_points\": [\"<key point>\", ...],
  \"details\": \"<the full explanation>\",
  \"conclusion\": \"<concise final answer>\",
  \"confidence\": <0.0 to 1.0>
}";

pub const CRITIC_SYSTEM: &str = "\
You are the critic in a moderated review workflow. Score the expert's \
answer against the user's question. Be specific: point at concrete \
problems, quote the offending passage when you can, and acknowledge what \
is already good.

Set passed to true only when the answer needs no further iteration.

Reply with a single JSON object and nothing else:
{
  \"overall_score\": <0 to 100>,
  \"passed\": true | false,
  \"issues\": [
    {
      \"category\": \"factual\" | \"logical\" | \"completeness\" | \"clarity\" | \"other\",
      \"severity\": \"low\" | \"medium\" | \"high\",
      \"description\": \"<what is wrong>\",
      \"quote\": \"<offending passage, optional>\"
    }
  ],
  \"strengths\": [\"<what works>\", ...],
  \"suggestions\": [\"<concrete improvement>\", ...]
}";

pub const MODERATOR_SYNTHESIS_SYSTEM: &str = "\
You are the moderator closing one round of an expert review workflow. \
Weigh the critic's feedback: sort the issues into valid and invalid, then \
decide whether another round would meaningfully improve the answer.

Decide end when the answer is good enough or further rounds would only \
restate it; decide continue when concrete, fixable issues remain.

Reply with a single JSON object and nothing else:
{
  \"feedback_validation\": {
    \"valid_issues\": [\"<issue worth fixing>\", ...],
    \"invalid_issues\": [\"<issue to discard>\", ...]
  },
  \"decision\": \"end\" | \"continue\",
  \"improvement_guidance\": \"<what the expert should change — required when decision is continue>\",
  \"iteration_summary\": \"<one sentence summarising this round>\"
}";

/// User message for the moderator's opening analysis.
pub fn moderator_init_user(question: &str, context: &str) -> String {
    let mut out = String::new();
    if !context.is_empty() {
        out.push_str("Earlier conversation:\n");
        out.push_str(context);
    }
    out.push_str("Question:\n");
    out.push_str(question);
    out
}

/// User message for the expert. Rounds after the first carry the previous
/// critic review and the moderator's improvement guidance.
pub fn expert_user(
    question: &str,
    context: &str,
    iteration: u32,
    prior_review: Option<&CriticReview>,
    guidance: Option<&str>,
) -> String {
    let mut out = String::new();
    if !context.is_empty() {
        out.push_str("Earlier conversation:\n");
        out.push_str(context);
    }
    out.push_str("Question:\n");
    out.push_str(question);

    if iteration > 1 {
        if let Some(review) = prior_review {
            out.push_str("\n\nYour previous answer was reviewed (score ");
            out.push_str(&format!("{:.0}/100).", review.overall_score));
            if !review.issues.is_empty() {
                out.push_str("\nIssues raised:\n");
                for issue in &review.issues {
                    out.push_str(&format!(
                        "- [{:?}/{:?}] {}\n",
                        issue.category, issue.severity, issue.description
                    ));
                }
            }
            if !review.suggestions.is_empty() {
                out.push_str("Suggestions:\n");
                for s in &review.suggestions {
                    out.push_str(&format!("- {s}\n"));
                }
            }
        }
        if let Some(g) = guidance {
            out.push_str("\nModerator guidance:\n");
            out.push_str(g);
        }
        out.push_str("\n\nWrite an improved answer.");
    }
    out
}

/// User message for the critic: the question and the current expert answer.
/// Prior rounds are deliberately excluded so each review stays local.
pub fn critic_user(question: &str, answer: &ExpertAnswer) -> String {
    let mut out = String::new();
    out.push_str("Question:\n");
    out.push_str(question);
    out.push_str("\n\nExpert answer under review:\n");
    out.push_str(&format!("Understanding: {}\n", answer.understanding));
    if !answer.core_points.is_empty() {
        out.push_str("Core points:\n");
        for p in &answer.core_points {
            out.push_str(&format!("- {p}\n"));
        }
    }
    out.push_str(&format!("Details: {}\n", answer.details));
    out.push_str(&format!("Conclusion: {}\n", answer.conclusion));
    out.push_str(&format!("Stated confidence: {:.2}\n", answer.confidence));
    out
}

/// User message for the moderator's end-of-round synthesis: the full round
/// transcript plus where the debate stands against its bounds.
pub fn moderator_synthesis_user(
    question: &str,
    answer: &ExpertAnswer,
    review: &CriticReview,
    iteration: u32,
    max_iterations: u32,
    score_threshold: f64,
) -> String {
    let mut out = String::new();
    out.push_str("Question:\n");
    out.push_str(question);
    out.push_str(&format!(
        "\n\nRound {iteration} of at most {max_iterations}. Passing score: {score_threshold:.0}.\n"
    ));
    out.push_str(&format!(
        "\nExpert conclusion: {}\nExpert details: {}\n",
        answer.conclusion, answer.details
    ));
    out.push_str(&format!(
        "\nCritic score: {:.0}/100, passed: {}.\n",
        review.overall_score, review.passed
    ));
    if !review.issues.is_empty() {
        out.push_str("Critic issues:\n");
        for issue in &review.issues {
            out.push_str(&format!(
                "- [{:?}/{:?}] {}\n",
                issue.category, issue.severity, issue.description
            ));
        }
    }
    if !review.strengths.is_empty() {
        out.push_str("Critic strengths:\n");
        for s in &review.strengths {
            out.push_str(&format!("- {s}\n"));
        }
    }
    out
}
