//! Scoring
//!
//! Pure functions from finalized round submissions to per-player point
//! deltas. Stateless and idempotent: the same input always produces the
//! same deltas, so game points are recomputed from the round records on
//! demand instead of being stored.

use crate::types::{ReviewedAnswer, RoundRecord, RoundSubmission, UserId, Verdict};
use std::collections::HashMap;

/// Point values, pluggable per deployment. Duplicated answers score
/// `duplicate_points` for every player in the duplicate group.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub unique_points: i64,
    pub duplicate_points: i64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            unique_points: 10,
            duplicate_points: 0,
        }
    }
}

/// An answer stands unless its text is blank or the non-self reviewers
/// who cast a verdict rejected it by majority. An answer nobody reviewed
/// is valid.
fn answer_is_valid(answer: &ReviewedAnswer, author: &UserId) -> bool {
    if answer.text.trim().is_empty() {
        return false;
    }

    let mut accepts = 0u32;
    let mut rejects = 0u32;
    for (reviewer, verdict) in &answer.verdicts {
        if reviewer == author {
            continue;
        }
        match verdict {
            Verdict::Accepted => accepts += 1,
            Verdict::Rejected => rejects += 1,
            Verdict::Pending => {}
        }
    }

    rejects <= accepts
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Per-player deltas for one finalized round.
pub fn round_deltas(
    submissions: &[RoundSubmission],
    policy: &ScoringPolicy,
) -> HashMap<UserId, i64> {
    let mut deltas: HashMap<UserId, i64> = HashMap::new();

    // Every author gets an entry even if all their answers were invalid
    for submission in submissions {
        deltas.entry(submission.user_id.clone()).or_insert(0);
    }

    // Count valid answers per (category, normalized text) to find duplicates
    let mut occurrences: HashMap<(String, String), u32> = HashMap::new();
    for submission in submissions {
        for answer in &submission.answers {
            if answer_is_valid(answer, &submission.user_id) {
                *occurrences
                    .entry((answer.category.clone(), normalize(&answer.text)))
                    .or_insert(0) += 1;
            }
        }
    }

    for submission in submissions {
        for answer in &submission.answers {
            if !answer_is_valid(answer, &submission.user_id) {
                continue;
            }
            let key = (answer.category.clone(), normalize(&answer.text));
            let points = if occurrences.get(&key).copied().unwrap_or(0) > 1 {
                policy.duplicate_points
            } else {
                policy.unique_points
            };
            *deltas.entry(submission.user_id.clone()).or_insert(0) += points;
        }
    }

    deltas
}

/// Accumulated points across all completed rounds, derived from the
/// records every time.
pub fn game_points(records: &[RoundRecord], policy: &ScoringPolicy) -> HashMap<UserId, i64> {
    let mut totals: HashMap<UserId, i64> = HashMap::new();
    for record in records {
        for (user, delta) in round_deltas(&record.submissions, policy) {
            *totals.entry(user).or_insert(0) += delta;
        }
    }
    totals
}
