//! Model selection: priority ordering, small-model scan, and fuzzy
//! suggestions for lookup misses.

use crate::types::Model;

/// Preferred model-name fragments, best first. Earlier fragments always
/// outrank later ones; models matching none rank last.
pub(crate) const PRIORITY_FRAGMENTS: &[&str] = &[
    "grok-code-fast-1",
    "claude-sonnet-4.5",
    "claude-sonnet-4-5",
    "gpt-5.1-codex",
    "gpt-5",
    "gemini-2.5-pro",
    "claude-opus",
    "qwen2.5-coder",
];

/// Small/cheap model-name fragments, best first.
pub(crate) const SMALL_FRAGMENTS: &[&str] = &["haiku", "flash", "mini", "nano", "lite"];

/// Known-good small-model fallback when nothing matches.
pub(crate) const SMALL_FALLBACK: (&str, &str) = ("anthropic", "claude-haiku-4-5");

/// Maximum fuzzy-match suggestions attached to a lookup miss.
pub(crate) const MAX_SUGGESTIONS: usize = 3;

fn priority_rank(id: &str) -> usize {
    PRIORITY_FRAGMENTS
        .iter()
        .position(|fragment| id.contains(fragment))
        .unwrap_or(usize::MAX)
}

/// Sort models best-first:
/// 1. position of the first matching priority fragment (non-matching last);
/// 2. ids containing "latest" before those that don't;
/// 3. remaining ties by id, reverse lexicographic.
pub fn sort_by_priority(models: &mut [&Model]) {
    models.sort_by(|a, b| {
        priority_rank(&a.id)
            .cmp(&priority_rank(&b.id))
            .then_with(|| {
                let a_latest = a.id.contains("latest");
                let b_latest = b.id.contains("latest");
                b_latest.cmp(&a_latest)
            })
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Up to [`MAX_SUGGESTIONS`] candidates ranked by edit distance to
/// `target`. No distance cutoff: the closest candidates win regardless of
/// how far away they are. Distance ties break lexicographically so the
/// result is deterministic.
pub(crate) fn suggestions<'a>(
    target: &str,
    candidates: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let mut ranked: Vec<(usize, &str)> = candidates
        .map(|candidate| (levenshtein_distance(target, candidate), candidate))
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}
