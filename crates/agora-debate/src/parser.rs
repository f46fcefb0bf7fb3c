//! Extracts and validates role artifacts from free-form LLM replies.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or code
//! fences, leave trailing commas, or use typographic quotes. The parse
//! pipeline is: locate the outermost balanced object, try a strict decode,
//! retry after bounded repairs, and finally fabricate a minimal valid
//! artifact so a single malformed reply degrades one round instead of the
//! whole request.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::artifact::{
    Complexity, CriticReview, ExpertAnswer, FeedbackValidation, InitDecision, Issue,
    IssueCategory, ModeratorInit, ModeratorSynthesis, Severity, SynthDecision,
};

/// Character budget when salvaging prose into a fallback artifact field.
const SALVAGE_CHARS: usize = 400;

/// Parse the moderator's opening analysis.
///
/// A reply with `decision = direct_answer` but no `direct_answer` text is
/// downgraded to `delegate_expert` — the debate can recover, a missing
/// answer cannot.
pub fn parse_moderator_init(raw: &str) -> ModeratorInit {
    match decode::<ModeratorInit>(raw) {
        Some(mut init) => {
            if init.decision == InitDecision::DirectAnswer
                && init
                    .direct_answer
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty()
            {
                warn!("moderator chose direct_answer without text, delegating to expert");
                init.decision = InitDecision::DelegateExpert;
                init.direct_answer = None;
            }
            init
        }
        None => {
            warn!("failed to parse moderator init, delegating to expert");
            ModeratorInit {
                intent: salvage(raw),
                key_constraints: Vec::new(),
                complexity: Complexity::Moderate,
                complexity_reason: "moderator reply could not be parsed".to_string(),
                decision: InitDecision::DelegateExpert,
                direct_answer: None,
            }
        }
    }
}

/// Parse an expert answer. Confidence is clamped to [0, 1].
pub fn parse_expert_answer(raw: &str) -> ExpertAnswer {
    match decode::<ExpertAnswer>(raw) {
        Some(mut answer) => {
            answer.confidence = answer.confidence.clamp(0.0, 1.0);
            answer
        }
        None => {
            warn!("failed to parse expert answer, salvaging raw text");
            ExpertAnswer {
                understanding: salvage(raw),
                core_points: Vec::new(),
                details: raw.trim().to_string(),
                conclusion: salvage(raw),
                confidence: 0.0,
            }
        }
    }
}

/// Parse a critic review. The score is clamped to [0, 100].
///
/// The fabricated fallback fails the round: score 0, not passed, one
/// high-severity issue describing the parse failure.
pub fn parse_critic_review(raw: &str) -> CriticReview {
    match decode::<CriticReview>(raw) {
        Some(mut review) => {
            review.overall_score = review.overall_score.clamp(0.0, 100.0);
            review
        }
        None => {
            warn!("failed to parse critic review, fabricating failing review");
            CriticReview {
                overall_score: 0.0,
                passed: false,
                issues: vec![Issue {
                    category: IssueCategory::Other,
                    severity: Severity::High,
                    description: format!(
                        "critic reply could not be parsed as JSON: {}",
                        salvage(raw)
                    ),
                    quote: None,
                }],
                strengths: Vec::new(),
                suggestions: vec!["Reply with a single valid JSON object.".to_string()],
            }
        }
    }
}

/// Parse a moderator synthesis.
///
/// A `continue` verdict without guidance gets a generic instruction; a
/// completely unparseable reply becomes `continue` with reformatting
/// guidance so the debate presses on.
pub fn parse_moderator_synthesis(raw: &str) -> ModeratorSynthesis {
    match decode::<ModeratorSynthesis>(raw) {
        Some(mut synth) => {
            if synth.decision == SynthDecision::Continue
                && synth
                    .improvement_guidance
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty()
            {
                synth.improvement_guidance =
                    Some("Address the critic's open issues and tighten the answer.".to_string());
            }
            synth
        }
        None => {
            warn!("failed to parse moderator synthesis, fabricating continue verdict");
            ModeratorSynthesis {
                feedback_validation: FeedbackValidation::default(),
                decision: SynthDecision::Continue,
                improvement_guidance: Some(
                    "The previous reply was not valid JSON. Respond strictly in the required JSON format."
                        .to_string(),
                ),
                iteration_summary: "Moderator reply could not be parsed.".to_string(),
                termination_reason: None,
            }
        }
    }
}

// ── Decode pipeline ──────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let span = extract_json_object(raw)?;
    if let Ok(value) = serde_json::from_str::<T>(span) {
        return Some(value);
    }
    let repaired = repair_json(span);
    serde_json::from_str::<T>(&repaired).ok()
}

/// Locate the outermost balanced `{…}` span, tolerating surrounding prose
/// and code-fence markers. Returns `None` when no balanced object exists.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Bounded repairs for near-JSON: typographic quotes become ASCII quotes,
/// `//` line comments are dropped, and commas dangling before a closing
/// bracket are removed. String content is preserved.
pub fn repair_json(span: &str) -> String {
    // Quote normalization first so repaired delimiters participate in the
    // string-awareness of the passes below.
    let normalized: String = span
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let without_comments = strip_line_comments(&normalized);
    strip_trailing_commas(&without_comments)
}

fn strip_line_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '}' | ']' => {
                // Drop a comma that only whitespace separates from this bracket.
                let trimmed_len = out.trim_end().len();
                if out[..trimmed_len].ends_with(',') {
                    out.truncate(trimmed_len - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// First `SALVAGE_CHARS` characters of the trimmed raw reply, for fallback
/// artifact fields.
fn salvage(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "(empty reply)".to_string();
    }
    if trimmed.chars().count() <= SALVAGE_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(SALVAGE_CHARS).collect()
    }
}
