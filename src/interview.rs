//! Interview phase selection and scoring.
//!
//! The phase selector is a pure function of the conversation: it counts
//! assistant-authored messages and decides whether the next model turn asks
//! another question or emits the final scored report. Keeping it free of
//! side effects is what makes the relay's prompt choice testable without a
//! provider.

use crate::provider::message::{Message, Role};

/// The marker line the reporting prompt instructs the model to end with.
pub const SCORE_MARKER: &str = "Score:";

/// Placeholder answer submitted when the candidate's time runs out.
pub const TIMEOUT_ANSWER: &str = "(no answer — time expired)";

/// Interview phase for the next model turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ask the next question.
    Interviewing,
    /// Stop asking; emit the final scored assessment.
    Reporting,
}

/// Output of the phase selector: the phase plus the system instruction the
/// relay forwards to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    /// Phase for the next model turn.
    pub phase: Phase,
    /// System prompt derived from phase, role, level, and turn count.
    pub system_prompt: String,
}

/// The turn counter: number of assistant-authored messages so far.
///
/// This is the count the phase decision is keyed on. It is always derived by
/// filtering the message list, never carried as separate mutable state, so
/// it cannot drift from the conversation across retries.
pub fn count_assistant_turns(messages: &[Message]) -> usize {
    messages.iter().filter(|m| m.role == Role::Assistant).count()
}

/// Decide the phase and system prompt for the next model turn.
///
/// Returns [`Phase::Reporting`] exactly when the assistant-turn count has
/// reached `threshold`; below that, the interviewer keeps asking questions.
pub fn select_phase(messages: &[Message], role: &str, level: &str, threshold: usize) -> PhasePlan {
    let turns = count_assistant_turns(messages);

    if turns >= threshold {
        PhasePlan {
            phase: Phase::Reporting,
            system_prompt: format!(
                "You are a strict {level} level technical interviewer for {role}. \
                 The interview is over after {turns} questions. Do not ask anything \
                 further. Write a short final assessment of the candidate in \
                 markdown: strengths, weaknesses, and one concrete improvement. \
                 End your reply with a line of the exact form '{SCORE_MARKER} X/10'."
            ),
        }
    } else {
        PhasePlan {
            phase: Phase::Interviewing,
            system_prompt: format!(
                "You are a strict {level} level technical interviewer for {role}. \
                 So far you have asked {turns} question(s). Give brief feedback on \
                 the candidate's last answer if there is one, then ask exactly one \
                 clear, concise technical question. Reply in markdown. Be concise."
            ),
        }
    }
}

/// Extract the `X/10` score fragment from a final report.
///
/// Scans for the last occurrence of the marker so that a model quoting the
/// instruction earlier in the reply does not confuse extraction. Accepts
/// 0–10; anything else is treated as no score.
pub fn extract_score(reply: &str) -> Option<String> {
    let start = reply.rfind(SCORE_MARKER)? + SCORE_MARKER.len();
    let rest = reply[start..].trim_start();

    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    let value: u32 = digits.parse().ok()?;
    if value > 10 {
        return None;
    }

    let after = rest[digits.len()..].trim_start();
    if !after.starts_with("/10") {
        return None;
    }

    Some(format!("{value}/10"))
}
