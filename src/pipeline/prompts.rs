// src/pipeline/prompts.rs — Stage prompt templates and response parsing

/// Appended to the soul for the clarify call.
pub const CLARIFY_INSTRUCTION: &str = "\
Restate the user's request as a precise work order with these sections:

GOAL: one sentence, what must be produced.
CONSTRAINTS: hard limits (format, length, tone, tools).
EXPECTED_OUTPUT: what the finished result looks like.
VERIFICATION: how to check the result is correct.

Do not begin working on the task. Output the four sections only.";

/// Appended to the soul for the plan call.
pub const PLAN_INSTRUCTION: &str = "\
Break the clarified work order into the smallest set of concrete steps
that completes it. For each step give one line: what it does and what it
depends on. Prefer a single step when the task is simple.";

/// System prompt for the review call.
pub const REVIEW_INSTRUCTION: &str = "\
You are reviewing a completed task result. Judge correctness,
completeness, and usefulness against the stated goal. Respond in exactly
this format:

SCORE: <0.0-1.0>
NOTES: <one short paragraph of findings>";

/// System prompt for the lightweight reflection call.
pub const REFLECT_INSTRUCTION: &str = "\
Reflect briefly on the task that just completed: what worked, what was
wasteful, and what to do differently on similar tasks. Three sentences
at most.";

/// Extract `SCORE: x.y` and the NOTES body from a review response.
/// An unparseable score falls back to `default_quality`; parsed scores are
/// clamped to [0,1].
pub fn parse_review(text: &str, default_quality: f64) -> (f64, String) {
    let mut score = None;
    let mut notes = Vec::new();
    let mut in_notes = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_prefix_ci(trimmed, "SCORE:") {
            score = rest.trim().parse::<f64>().ok();
        } else if let Some(rest) = strip_prefix_ci(trimmed, "NOTES:") {
            in_notes = true;
            if !rest.trim().is_empty() {
                notes.push(rest.trim().to_string());
            }
        } else if in_notes && !trimmed.is_empty() {
            notes.push(trimmed.to_string());
        }
    }

    let quality = score.map(|s| s.clamp(0.0, 1.0)).unwrap_or(default_quality);
    let notes = if notes.is_empty() {
        text.trim().to_string()
    } else {
        notes.join(" ")
    };
    (quality, notes)
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
