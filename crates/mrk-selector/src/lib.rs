use mrk_candidates::{Candidate, CandidateSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of ranking a candidate set by one primary metric.
#[derive(Debug, Clone)]
pub struct Selection {
    pub winner: Candidate,
    /// The comparison value, per [`extract_score`]. Always equals
    /// `extract_score(&winner, primary_metric)`.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// Selection was invoked with zero candidates. The loader already guards
    /// this; the check here protects against future callers bypassing it.
    EmptyCandidateSet,
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::EmptyCandidateSet => write!(f, "candidate set is empty"),
        }
    }
}

impl std::error::Error for SelectError {}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Score used to rank a candidate.
///
/// A candidate whose record never computed the primary metric (or stored an
/// unparseable value, which normalization already dropped) scores exactly
/// `0.0`. This is deliberate policy, not error suppression: candidates with a
/// valid score always outrank ones without, and a metrics-less candidate can
/// still win when it is the only contender. Do not "fix" this to an error.
pub fn extract_score(candidate: &Candidate, primary_metric: &str) -> f64 {
    candidate.metrics.get(primary_metric).copied().unwrap_or(0.0)
}

/// Pick the winning candidate: strictly greatest score under the primary
/// metric. Ties keep the earliest candidate in the set's order (the order
/// candidate names were requested in), so repeated runs over the same set
/// always produce the same winner.
pub fn select(set: &CandidateSet, primary_metric: &str) -> Result<Selection, SelectError> {
    let mut best: Option<(&Candidate, f64)> = None;

    for candidate in set.candidates() {
        let score = extract_score(candidate, primary_metric);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }

    let (winner, score) = best.ok_or(SelectError::EmptyCandidateSet)?;
    Ok(Selection {
        winner: winner.clone(),
        score,
    })
}
