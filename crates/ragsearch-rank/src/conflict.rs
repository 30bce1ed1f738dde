//! Resolution of competing versions of the same logical chunk.
//!
//! Candidates are grouped by `(source_id, chunk_index)`. `doc_id` is left out
//! of the key on purpose: re-ingesting a document may assign a new `doc_id`
//! while the logical unit stays the same.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ragsearch_core::types::{ChunkId, SearchCandidate};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictGroupKey {
    pub source_id: String,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    VersionConflict,
    AuthorityConflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub group_key: ConflictGroupKey,
    pub resolution: ConflictKind,
    /// Superseded members, in resolution order.
    pub losing_members: Vec<ChunkId>,
    pub winner_id: ChunkId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// One winner per group, in first-seen group order. Callers sort.
    pub winners: Vec<SearchCandidate>,
    pub conflicts: Vec<ConflictReport>,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    priorities: HashMap<String, i64>,
}

impl ConflictResolver {
    pub fn new(priorities: HashMap<String, i64>) -> Self {
        Self { priorities }
    }

    /// Unknown sources rank at `0`.
    pub fn priority(&self, source: &str) -> i64 {
        self.priorities.get(source).copied().unwrap_or(0)
    }

    /// Higher authority first, then newer version. Score and id only break
    /// exact ties so the outcome never depends on input order.
    fn precedence(&self, a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
        self.priority(&b.source).cmp(&self.priority(&a.source))
            .then_with(|| b.version.cmp(&a.version))
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.id.cmp(&b.id))
    }

    pub fn resolve(&self, candidates: &[SearchCandidate]) -> Resolution {
        let mut order: Vec<ConflictGroupKey> = Vec::new();
        let mut groups: HashMap<ConflictGroupKey, Vec<&SearchCandidate>> = HashMap::new();
        for c in candidates {
            let key = ConflictGroupKey { source_id: c.source_id.clone(), chunk_index: c.chunk_index };
            groups.entry(key.clone()).or_insert_with(|| { order.push(key); Vec::new() }).push(c);
        }

        let mut out = Resolution::default();
        for key in order {
            let Some(mut members) = groups.remove(&key) else { continue };
            members.sort_by(|a, b| self.precedence(a, b));
            let winner = members[0];
            if members.len() > 1 {
                let kind = if members.iter().any(|m| m.version != winner.version) {
                    Some(ConflictKind::VersionConflict)
                } else if members.iter().any(|m| m.source != winner.source) {
                    Some(ConflictKind::AuthorityConflict)
                } else {
                    None
                };
                if let Some(resolution) = kind {
                    debug!(source_id = %key.source_id, chunk_index = key.chunk_index, ?resolution, winner = %winner.id, "resolved conflict");
                    out.conflicts.push(ConflictReport {
                        group_key: key,
                        resolution,
                        losing_members: members[1..].iter().map(|m| m.id.clone()).collect(),
                        winner_id: winner.id.clone(),
                    });
                }
            }
            out.winners.push(winner.clone());
        }
        out
    }
}
