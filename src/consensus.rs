//! Choosing a winner from scored replies.
//!
//! All strategies consume the scored replies in their original order and
//! break ties by that order. Voting strategies measure agreement with plain
//! Jaccard token overlap — surface agreement, not the TF-IDF-weighted
//! similarity the consensus scorer uses.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::OrchestratorError;
use crate::scoring::ScoredReply;
use crate::scoring::similarity::jaccard;

/// The verdict of one consensus pass. Created exactly once per pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusOutcome {
    pub consensus_reached: bool,
    pub best_content: Option<String>,
    pub best_provider: Option<String>,
    pub best_score: f64,
    pub confidence: f64,
    pub agreement_count: usize,
    pub total_models: usize,
    pub dissenting_providers: Vec<String>,
    pub all_scored: Vec<ScoredReply>,
}

impl ConsensusOutcome {
    /// Outcome for an empty reply set.
    fn empty() -> Self {
        Self {
            consensus_reached: false,
            best_content: None,
            best_provider: None,
            best_score: 0.0,
            confidence: 0.0,
            agreement_count: 0,
            total_models: 0,
            dissenting_providers: Vec::new(),
            all_scored: Vec::new(),
        }
    }
}

/// How the winner is chosen.
#[derive(Debug, Clone)]
pub enum ConsensusStrategy {
    /// The best score wins outright; always reaches consensus.
    HighestScore,
    /// Greedy Jaccard clustering; the largest cluster must hold a strict
    /// majority.
    MajorityVote { threshold: f64 },
    /// The best-agreed candidate must have at least `required` peers
    /// (itself included) within `threshold` similarity.
    Quorum { required: usize, threshold: f64 },
}

impl ConsensusStrategy {
    /// Quorum constructor; `required` below one is meaningless.
    pub fn quorum(required: usize, threshold: f64) -> Result<Self, OrchestratorError> {
        if required < 1 {
            return Err(OrchestratorError::InvalidArgument(
                "quorum requires at least one agreeing reply".to_string(),
            ));
        }
        Ok(ConsensusStrategy::Quorum {
            required,
            threshold,
        })
    }

    /// Rank the scored replies and decide the winner.
    pub fn decide(&self, scored: &[ScoredReply]) -> ConsensusOutcome {
        if scored.is_empty() {
            return ConsensusOutcome::empty();
        }
        match self {
            ConsensusStrategy::HighestScore => decide_highest_score(scored),
            ConsensusStrategy::MajorityVote { threshold } => {
                decide_majority_vote(scored, *threshold)
            }
            ConsensusStrategy::Quorum {
                required,
                threshold,
            } => decide_quorum(scored, *required, *threshold),
        }
    }
}

fn decide_highest_score(scored: &[ScoredReply]) -> ConsensusOutcome {
    let mut ranked: Vec<&ScoredReply> = scored.iter().collect();
    // Stable sort: equal scores keep insertion order.
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    let winner = ranked[0];

    let confidence = if scored.len() == 1 {
        1.0
    } else {
        (0.5 + (winner.score - ranked[1].score)).min(1.0)
    };

    let dissenting: Vec<String> = scored
        .iter()
        .filter(|r| r.provider_name != winner.provider_name)
        .map(|r| r.provider_name.clone())
        .collect();

    ConsensusOutcome {
        consensus_reached: true,
        best_content: Some(winner.content.clone()),
        best_provider: Some(winner.provider_name.clone()),
        best_score: winner.score,
        confidence,
        agreement_count: scored.len() - dissenting.len(),
        total_models: scored.len(),
        dissenting_providers: dissenting,
        all_scored: scored.to_vec(),
    }
}

fn decide_majority_vote(scored: &[ScoredReply], threshold: f64) -> ConsensusOutcome {
    let total = scored.len();

    // Greedy clustering: each unassigned reply seeds a cluster, then every
    // later unassigned reply similar enough to the seed joins it.
    let mut cluster_of: Vec<Option<usize>> = vec![None; total];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for seed in 0..total {
        if cluster_of[seed].is_some() {
            continue;
        }
        let cluster_id = clusters.len();
        let mut members = vec![seed];
        cluster_of[seed] = Some(cluster_id);
        for candidate in seed + 1..total {
            if cluster_of[candidate].is_none()
                && jaccard(&scored[candidate].content, &scored[seed].content) >= threshold
            {
                cluster_of[candidate] = Some(cluster_id);
                members.push(candidate);
            }
        }
        clusters.push(members);
    }

    // Largest cluster; strict comparison keeps the earliest seed on ties.
    let mut largest_id = 0;
    for (id, members) in clusters.iter().enumerate() {
        if members.len() > clusters[largest_id].len() {
            largest_id = id;
        }
    }
    let largest = clusters[largest_id].clone();

    // Highest score within the cluster; earliest index wins a score tie.
    let mut winner_index = largest[0];
    for &index in &largest {
        if scored[index].score > scored[winner_index].score {
            winner_index = index;
        }
    }
    let winner = &scored[winner_index];

    let dissenting: Vec<String> = (0..total)
        .filter(|i| !largest.contains(i))
        .map(|i| scored[i].provider_name.clone())
        .collect();

    ConsensusOutcome {
        consensus_reached: largest.len() * 2 > total,
        best_content: Some(winner.content.clone()),
        best_provider: Some(winner.provider_name.clone()),
        best_score: winner.score,
        confidence: largest.len() as f64 / total as f64,
        agreement_count: largest.len(),
        total_models: total,
        dissenting_providers: dissenting,
        all_scored: scored.to_vec(),
    }
}

fn decide_quorum(scored: &[ScoredReply], required: usize, threshold: f64) -> ConsensusOutcome {
    let total = scored.len();

    // For each candidate, which replies (itself included) agree with it?
    let agreement_sets: Vec<Vec<usize>> = (0..total)
        .map(|candidate| {
            (0..total)
                .filter(|&other| {
                    other == candidate
                        || jaccard(&scored[candidate].content, &scored[other].content)
                            >= threshold
                })
                .collect()
        })
        .collect();

    // Best-agreed candidate; strict comparison keeps the earliest on ties.
    let mut best = 0;
    for candidate in 1..total {
        if agreement_sets[candidate].len() > agreement_sets[best].len() {
            best = candidate;
        }
    }

    let agreeing = &agreement_sets[best];
    let winner = &scored[best];
    let dissenting: Vec<String> = (0..total)
        .filter(|i| !agreeing.contains(i))
        .map(|i| scored[i].provider_name.clone())
        .collect();

    ConsensusOutcome {
        consensus_reached: agreeing.len() >= required,
        best_content: Some(winner.content.clone()),
        best_provider: Some(winner.provider_name.clone()),
        best_score: winner.score,
        confidence: agreeing.len() as f64 / total as f64,
        agreement_count: agreeing.len(),
        total_models: total,
        dissenting_providers: dissenting,
        all_scored: scored.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn scored(provider: &str, content: &str, score: f64) -> ScoredReply {
        ScoredReply {
            provider_name: provider.to_string(),
            content: content.to_string(),
            score,
            breakdown: HashMap::new(),
            response_time: Duration::from_millis(100),
            total_tokens: 40,
        }
    }

    fn assert_partition(outcome: &ConsensusOutcome) {
        assert_eq!(
            outcome.agreement_count + outcome.dissenting_providers.len(),
            outcome.total_models
        );
        assert_eq!(outcome.total_models, outcome.all_scored.len());
    }

    #[test]
    fn test_empty_input() {
        for strategy in [
            ConsensusStrategy::HighestScore,
            ConsensusStrategy::MajorityVote { threshold: 0.6 },
            ConsensusStrategy::quorum(2, 0.6).unwrap(),
        ] {
            let outcome = strategy.decide(&[]);
            assert!(!outcome.consensus_reached);
            assert_eq!(outcome.confidence, 0.0);
            assert!(outcome.best_provider.is_none());
        }
    }

    #[test]
    fn test_highest_score_picks_head_and_counts_dissent() {
        let replies = vec![
            scored("a", "Paris", 0.9),
            scored("b", "Paris", 0.7),
            scored("c", "Lyon", 0.4),
        ];
        let outcome = ConsensusStrategy::HighestScore.decide(&replies);
        assert!(outcome.consensus_reached);
        assert_eq!(outcome.best_provider.as_deref(), Some("a"));
        assert_eq!(outcome.best_score, 0.9);
        assert_eq!(outcome.dissenting_providers, ["b", "c"]);
        assert!((outcome.confidence - 0.7).abs() < 1e-9);
        assert_partition(&outcome);
    }

    #[test]
    fn test_highest_score_tie_keeps_insertion_order() {
        let replies = vec![
            scored("first", "Paris", 0.8),
            scored("second", "Paris", 0.8),
        ];
        let outcome = ConsensusStrategy::HighestScore.decide(&replies);
        assert_eq!(outcome.best_provider.as_deref(), Some("first"));
        assert!((outcome.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_highest_score_single_reply_full_confidence() {
        let outcome = ConsensusStrategy::HighestScore.decide(&[scored("solo", "Paris", 0.4)]);
        assert!(outcome.consensus_reached);
        assert_eq!(outcome.confidence, 1.0);
        assert!(outcome.dissenting_providers.is_empty());
        assert_partition(&outcome);
    }

    #[test]
    fn test_majority_vote_clusters_out_the_outlier() {
        let replies = vec![
            scored("a", "Paris is the capital city of France", 0.8),
            scored("b", "The capital of France is Paris", 0.9),
            scored("c", "quantum physics dark matter", 0.7),
        ];
        let outcome = ConsensusStrategy::MajorityVote { threshold: 0.6 }.decide(&replies);
        assert!(outcome.consensus_reached);
        assert_eq!(outcome.agreement_count, 2);
        assert_eq!(outcome.dissenting_providers, ["c"]);
        assert!((outcome.confidence - 2.0 / 3.0).abs() < 1e-9);
        // Winner is the best-scored member of the majority cluster.
        assert_eq!(outcome.best_provider.as_deref(), Some("b"));
        assert_partition(&outcome);
    }

    #[test]
    fn test_majority_vote_no_majority() {
        let replies = vec![
            scored("a", "alpha beta gamma", 0.8),
            scored("b", "delta epsilon zeta", 0.7),
            scored("c", "eta theta iota", 0.6),
        ];
        let outcome = ConsensusStrategy::MajorityVote { threshold: 0.6 }.decide(&replies);
        assert!(!outcome.consensus_reached);
        assert_eq!(outcome.agreement_count, 1);
        assert_partition(&outcome);
    }

    #[test]
    fn test_quorum_reached_with_similar_replies() {
        let replies = vec![
            scored("a", "the answer is forty two", 0.8),
            scored("b", "the answer is forty two", 0.7),
            scored("c", "the answer is forty two", 0.6),
        ];
        let outcome = ConsensusStrategy::quorum(3, 0.6).unwrap().decide(&replies);
        assert!(outcome.consensus_reached);
        assert_eq!(outcome.agreement_count, 3);
        assert_eq!(outcome.confidence, 1.0);
        assert!(outcome.dissenting_providers.is_empty());
        assert_partition(&outcome);
    }

    #[test]
    fn test_quorum_miss_with_dissimilar_replies() {
        let replies = vec![
            scored("a", "alpha beta gamma", 0.8),
            scored("b", "delta epsilon zeta", 0.7),
            scored("c", "eta theta iota", 0.6),
        ];
        let outcome = ConsensusStrategy::quorum(3, 0.6).unwrap().decide(&replies);
        assert!(!outcome.consensus_reached);
        // Each candidate only agrees with itself.
        assert_eq!(outcome.agreement_count, 1);
        assert!((outcome.confidence - 1.0 / 3.0).abs() < 1e-9);
        // A best response is still reported.
        assert!(outcome.best_provider.is_some());
        assert_partition(&outcome);
    }

    #[test]
    fn test_quorum_larger_than_reply_count_never_reaches() {
        let replies = vec![
            scored("a", "same words here", 0.8),
            scored("b", "same words here", 0.7),
        ];
        let outcome = ConsensusStrategy::quorum(5, 0.6).unwrap().decide(&replies);
        assert!(!outcome.consensus_reached);
        assert_eq!(outcome.agreement_count, 2);
    }

    #[test]
    fn test_quorum_rejects_zero_required() {
        assert!(ConsensusStrategy::quorum(0, 0.6).is_err());
    }
}
