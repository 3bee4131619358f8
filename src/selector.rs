//! Next-item selection.
//!
//! Scores every playable candidate against the listening history and the
//! content embeddings, then picks the best one.
//!
//! ```text
//! score(c) = jitter                                  uniform in [0, policy.jitter)
//!          - policy.repeat_penalty   if c in history
//!          + cosine(anchor, c)       if both vectors exist with nonzero magnitude
//! ```
//!
//! The anchor is the most recently played item, or the explicit anchor when
//! the history is empty. The penalty only biases: once every playable item
//! has been heard recently, the least similar-but-repeated one still wins.

use crate::catalog::ItemId;
use crate::embedding::{cosine_similarity, EmbeddingStore, EmbeddingVector};
use crate::history::HistoryRing;
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Tunable constants of the scoring blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Upper bound (exclusive) of the random tie-breaking term.
    pub jitter: f64,
    /// Amount subtracted from items present in the history.
    pub repeat_penalty: f64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            jitter: 0.01,
            repeat_penalty: 5.0,
        }
    }
}

/// A candidate together with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredItem {
    pub id: ItemId,
    pub score: f64,
}

/// Resolve the anchor vector: the last played item, else the explicit anchor.
#[must_use]
pub fn anchor_vector<'a, E>(
    history: &HistoryRing,
    embeddings: &'a E,
    anchor: Option<ItemId>,
) -> Option<&'a EmbeddingVector>
where
    E: EmbeddingStore + ?Sized,
{
    history
        .last()
        .or(anchor)
        .and_then(|id| embeddings.lookup(id))
}

/// Deterministic part of a candidate's score plus the supplied jitter sample.
///
/// # Examples
///
/// ```
/// use segue::catalog::ItemId;
/// use segue::embedding::NoEmbeddings;
/// use segue::history::HistoryRing;
/// use segue::selector::{score_candidate, SelectionPolicy};
///
/// let mut history = HistoryRing::new(10);
/// history.push(ItemId(5));
///
/// let policy = SelectionPolicy::default();
/// let repeat = score_candidate(ItemId(5), 0.0, &history, None, &NoEmbeddings, &policy);
/// let fresh = score_candidate(ItemId(6), 0.0, &history, None, &NoEmbeddings, &policy);
/// assert_eq!(fresh - repeat, 5.0);
/// ```
#[must_use]
pub fn score_candidate<E>(
    candidate: ItemId,
    jitter_sample: f64,
    history: &HistoryRing,
    anchor: Option<&EmbeddingVector>,
    embeddings: &E,
    policy: &SelectionPolicy,
) -> f64
where
    E: EmbeddingStore + ?Sized,
{
    let mut score = jitter_sample;

    if history.contains(candidate) {
        score -= policy.repeat_penalty;
    }

    if let (Some(anchor), Some(vector)) = (anchor, embeddings.lookup(candidate)) {
        score += cosine_similarity(anchor, vector);
    }

    score
}

/// Candidate scorer owning its random source.
///
/// Seeded selectors are fully reproducible; production code uses
/// [`Selector::from_entropy`].
#[derive(Debug, Clone)]
pub struct Selector<R = StdRng> {
    policy: SelectionPolicy,
    rng: R,
}

impl Selector<StdRng> {
    #[must_use]
    pub fn seeded(seed: u64, policy: SelectionPolicy) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    #[must_use]
    pub fn from_entropy(policy: SelectionPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }
}

impl<R: Rng> Selector<R> {
    #[must_use]
    pub fn with_rng(policy: SelectionPolicy, rng: R) -> Self {
        Self { policy, rng }
    }

    #[must_use]
    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    fn sample_jitter(&mut self) -> f64 {
        // gen::<f64>() is in [0, 1), so a zero jitter bound stays at zero
        self.rng.gen::<f64>() * self.policy.jitter
    }

    /// Pick the best playable candidate.
    ///
    /// Returns `None` when no candidate satisfies `is_playable`; the caller
    /// must then leave playback alone. Ties keep the first-seen candidate.
    pub fn select<P, E>(
        &mut self,
        candidates: &[ItemId],
        is_playable: P,
        history: &HistoryRing,
        embeddings: &E,
        anchor: Option<ItemId>,
    ) -> Option<ItemId>
    where
        P: Fn(ItemId) -> bool,
        E: EmbeddingStore + ?Sized,
    {
        let anchor_vec = anchor_vector(history, embeddings, anchor);
        let mut best: Option<ScoredItem> = None;

        for &candidate in candidates {
            if !is_playable(candidate) {
                continue;
            }
            let jitter = self.sample_jitter();
            let score = score_candidate(candidate, jitter, history, anchor_vec, embeddings, &self.policy);
            trace!("candidate {candidate}: score {score:.4}");

            if best.map_or(true, |b| score > b.score) {
                best = Some(ScoredItem { id: candidate, score });
            }
        }

        best.map(|b| b.id)
    }

    /// Score every playable candidate and return the top `count`, best first.
    ///
    /// Uses the same scoring as [`Selector::select`]; equal scores keep
    /// candidate order.
    pub fn rank<P, E>(
        &mut self,
        candidates: &[ItemId],
        is_playable: P,
        history: &HistoryRing,
        embeddings: &E,
        anchor: Option<ItemId>,
        count: usize,
    ) -> Vec<ScoredItem>
    where
        P: Fn(ItemId) -> bool,
        E: EmbeddingStore + ?Sized,
    {
        let anchor_vec = anchor_vector(history, embeddings, anchor);

        let mut scored: Vec<ScoredItem> = candidates
            .iter()
            .copied()
            .filter(|&id| is_playable(id))
            .map(|id| {
                let jitter = self.sample_jitter();
                ScoredItem {
                    id,
                    score: score_candidate(id, jitter, history, anchor_vec, embeddings, &self.policy),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(count);
        scored
    }
}
