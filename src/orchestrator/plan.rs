//! Retrieval plan: the arena the multi-hop state machine works over.

use serde::{Deserialize, Serialize};

use crate::fusion::Candidate;

/// Grading status of one subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubqueryStatus {
    /// Not yet retrieved in the current iteration.
    Pending,
    /// Graded sufficient; candidates are final.
    Sufficient,
    /// Graded insufficient; eligible for rewrite.
    Insufficient,
}

/// One decomposed subquery and everything retrieved for it so far.
#[derive(Debug, Clone)]
pub struct Subquery {
    /// Current text (replaced on rewrite).
    pub text: String,
    /// Text as decomposed, kept for narrowing rewrites.
    pub original_text: String,
    /// Indices of subqueries that must grade sufficient before this one
    /// becomes ready.
    pub depends_on: Vec<usize>,
    /// Grading status.
    pub status: SubqueryStatus,
    /// Best candidate set retrieved so far.
    pub candidates: Vec<Candidate>,
    /// Number of rewrites applied.
    pub rewrites: u32,
}

impl Subquery {
    pub fn new(text: String, depends_on: Vec<usize>) -> Self {
        Self {
            original_text: text.clone(),
            text,
            depends_on,
            status: SubqueryStatus::Pending,
            candidates: Vec::new(),
            rewrites: 0,
        }
    }
}

/// States of the multi-hop loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopState {
    Decompose,
    Retrieve,
    Grade,
    Rewrite,
    Synthesize,
    Done,
    /// Iteration bound reached without sufficiency. Not an error: the best
    /// partial set is still returned, flagged low-confidence.
    Failed,
}

impl HopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HopState::Decompose => "decompose",
            HopState::Retrieve => "retrieve",
            HopState::Grade => "grade",
            HopState::Rewrite => "rewrite",
            HopState::Synthesize => "synthesize",
            HopState::Done => "done",
            HopState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The plan object threaded through the state machine.
#[derive(Debug, Clone)]
pub struct RetrievalPlan {
    pub subqueries: Vec<Subquery>,
    /// Completed rewrite rounds. Checked against the bound before every
    /// re-entry into retrieval.
    pub iteration: u32,
    pub state: HopState,
}

impl RetrievalPlan {
    pub fn new(subqueries: Vec<Subquery>) -> Self {
        Self {
            subqueries,
            iteration: 0,
            state: HopState::Decompose,
        }
    }

    /// Indices of subqueries that are pending and whose dependencies have all
    /// graded sufficient. These may retrieve concurrently.
    pub fn ready_indices(&self) -> Vec<usize> {
        self.subqueries
            .iter()
            .enumerate()
            .filter(|(_, sq)| {
                sq.status == SubqueryStatus::Pending
                    && sq.depends_on.iter().all(|&dep| {
                        self.subqueries
                            .get(dep)
                            .is_some_and(|d| d.status == SubqueryStatus::Sufficient)
                    })
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Returns `true` once every subquery has graded sufficient.
    pub fn all_sufficient(&self) -> bool {
        self.subqueries
            .iter()
            .all(|sq| sq.status == SubqueryStatus::Sufficient)
    }

    /// Merged candidate pool across all subqueries, sufficient or not.
    pub fn merged_candidates(&self) -> Vec<Candidate> {
        self.subqueries
            .iter()
            .flat_map(|sq| sq.candidates.iter().cloned())
            .collect()
    }
}
