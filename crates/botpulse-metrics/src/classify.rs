//! Subject classification of conversation blocks

use botpulse_core::SubjectRules;

/// Resolve `block_name` to a configured subject
///
/// Returns the first candidate, in configuration order, that occurs in
/// `block_name` (case-sensitive). Empty candidates never match. Falls back to
/// the default subject, so the result is always a candidate or the default.
pub fn classify(block_name: &str, rules: &SubjectRules) -> String {
    rules
        .candidates
        .iter()
        .find(|candidate| !candidate.is_empty() && block_name.contains(candidate.as_str()))
        .unwrap_or(&rules.default_subject)
        .clone()
}
