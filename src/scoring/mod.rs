//! Reply scoring.
//!
//! A scorer maps one reply (in the context of its peers) to `[0, 1]`.
//! Degenerate inputs — a single reply, all-equal metrics, fewer than two
//! successful peers — universally score 1.0: with nothing to compare
//! against, no reply should be penalised.

pub mod similarity;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::OrchestratorError;
use crate::llm::Reply;
use crate::validation::Validator;

/// Weight-map key for [`ResponseTimeScorer`].
pub const RESPONSE_TIME: &str = "ResponseTime";
/// Weight-map key for [`ConsensusScorer`].
pub const CONSENSUS: &str = "Consensus";
/// Weight-map key for [`TokenEfficiencyScorer`].
pub const TOKEN_EFFICIENCY: &str = "TokenEfficiency";
/// Name of [`ValidationPassScorer`] (not a weight-map key: it needs
/// validators attached).
pub const VALIDATION_PASS: &str = "ValidationPass";
/// Name of the composite [`WeightedScorer`].
pub const WEIGHTED: &str = "Weighted";

/// A reply with its composite score and per-scorer breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredReply {
    pub provider_name: String,
    pub content: String,
    pub score: f64,
    pub breakdown: HashMap<String, f64>,
    pub response_time: Duration,
    pub total_tokens: u32,
}

/// Maps one reply plus its peers to `[0, 1]`.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, reply: &Reply, all_replies: &[Reply]) -> f64;
}

fn successful(replies: &[Reply]) -> Vec<&Reply> {
    replies.iter().filter(|r| r.success).collect()
}

/// Linear normalisation: `value` mapped so `min` scores 1.0 and `max` 0.0.
fn normalize_inverted(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return 1.0;
    }
    (1.0 - (value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Fastest successful peer scores 1.0, slowest 0.0.
pub struct ResponseTimeScorer;

#[async_trait]
impl Scorer for ResponseTimeScorer {
    fn name(&self) -> &str {
        RESPONSE_TIME
    }

    async fn score(&self, reply: &Reply, all_replies: &[Reply]) -> f64 {
        let peers = successful(all_replies);
        if peers.len() < 2 {
            return 1.0;
        }
        let times: Vec<f64> = peers.iter().map(|r| r.duration.as_secs_f64()).collect();
        let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        normalize_inverted(reply.duration.as_secs_f64(), min, max)
    }
}

/// Fewest completion tokens scores 1.0; peers without a positive token
/// count are left out of the comparison.
pub struct TokenEfficiencyScorer;

#[async_trait]
impl Scorer for TokenEfficiencyScorer {
    fn name(&self) -> &str {
        TOKEN_EFFICIENCY
    }

    async fn score(&self, reply: &Reply, all_replies: &[Reply]) -> f64 {
        let peers: Vec<&Reply> = successful(all_replies)
            .into_iter()
            .filter(|r| r.completion_tokens > 0)
            .collect();
        if peers.len() < 2 || reply.completion_tokens == 0 {
            return 1.0;
        }
        let counts: Vec<f64> = peers.iter().map(|r| r.completion_tokens as f64).collect();
        let min = counts.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        normalize_inverted(reply.completion_tokens as f64, min, max)
    }
}

/// Mean TF-IDF cosine similarity to every other successful reply, over the
/// corpus of all successful contents.
pub struct ConsensusScorer;

#[async_trait]
impl Scorer for ConsensusScorer {
    fn name(&self) -> &str {
        CONSENSUS
    }

    async fn score(&self, reply: &Reply, all_replies: &[Reply]) -> f64 {
        let peers = successful(all_replies);
        let others: Vec<&&Reply> = peers
            .iter()
            .filter(|r| r.provider_name != reply.provider_name)
            .collect();
        if others.is_empty() {
            return 1.0;
        }
        let corpus: Vec<String> = peers.iter().map(|r| r.content.clone()).collect();
        let total: f64 = others
            .iter()
            .map(|other| similarity::tfidf_cosine(&reply.content, &other.content, Some(&corpus)))
            .sum();
        (total / others.len() as f64).clamp(0.0, 1.0)
    }
}

/// Fraction of attached validators that pass for this reply.
pub struct ValidationPassScorer {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidationPassScorer {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl Scorer for ValidationPassScorer {
    fn name(&self) -> &str {
        VALIDATION_PASS
    }

    async fn score(&self, reply: &Reply, _all_replies: &[Reply]) -> f64 {
        if self.validators.is_empty() {
            return 1.0;
        }
        let mut passed = 0usize;
        for validator in &self.validators {
            if validator.validate(&reply.content).await.valid {
                passed += 1;
            }
        }
        passed as f64 / self.validators.len() as f64
    }
}

/// Weighted combination of scorers: `Σ(wᵢ · sᵢ) / Σw`, 0 when `Σw ≤ 0`.
pub struct WeightedScorer {
    components: Vec<(Arc<dyn Scorer>, f64)>,
}

impl std::fmt::Debug for WeightedScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedScorer")
            .field(
                "components",
                &self
                    .components
                    .iter()
                    .map(|(scorer, weight)| (scorer.name().to_string(), *weight))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl WeightedScorer {
    /// Negative weights are rejected at the boundary.
    pub fn new(components: Vec<(Arc<dyn Scorer>, f64)>) -> Result<Self, OrchestratorError> {
        for (scorer, weight) in &components {
            if *weight < 0.0 {
                return Err(OrchestratorError::InvalidArgument(format!(
                    "negative weight {weight} for scorer {}",
                    scorer.name()
                )));
            }
        }
        Ok(Self { components })
    }

    /// Equal weights over response time, consensus and token efficiency.
    pub fn standard() -> Self {
        Self {
            components: vec![
                (Arc::new(ResponseTimeScorer) as Arc<dyn Scorer>, 1.0),
                (Arc::new(ConsensusScorer) as Arc<dyn Scorer>, 1.0),
                (Arc::new(TokenEfficiencyScorer) as Arc<dyn Scorer>, 1.0),
            ],
        }
    }

    pub fn components(&self) -> &[(Arc<dyn Scorer>, f64)] {
        &self.components
    }

    /// Composite score plus the per-scorer breakdown.
    pub async fn score_detailed(
        &self,
        reply: &Reply,
        all_replies: &[Reply],
    ) -> (f64, HashMap<String, f64>) {
        let mut breakdown = HashMap::with_capacity(self.components.len());
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (scorer, weight) in &self.components {
            let component = scorer.score(reply, all_replies).await.clamp(0.0, 1.0);
            breakdown.insert(scorer.name().to_string(), component);
            weighted_sum += component * weight;
            total_weight += weight;
        }
        let score = if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (score, breakdown)
    }
}

#[async_trait]
impl Scorer for WeightedScorer {
    fn name(&self) -> &str {
        WEIGHTED
    }

    async fn score(&self, reply: &Reply, all_replies: &[Reply]) -> f64 {
        self.score_detailed(reply, all_replies).await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(provider: &str, content: &str, completion_tokens: u32, millis: u64) -> Reply {
        Reply::ok(
            provider,
            "test-model",
            content,
            10,
            completion_tokens,
            Duration::from_millis(millis),
        )
    }

    fn failed_reply(provider: &str) -> Reply {
        Reply::failed(provider, "test-model", "boom", Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_single_reply_scores_one_everywhere() {
        let only = reply("a", "Paris", 30, 100);
        let all = vec![only.clone()];
        assert_eq!(ResponseTimeScorer.score(&only, &all).await, 1.0);
        assert_eq!(TokenEfficiencyScorer.score(&only, &all).await, 1.0);
        assert_eq!(ConsensusScorer.score(&only, &all).await, 1.0);
    }

    #[tokio::test]
    async fn test_response_time_normalisation() {
        let fast = reply("fast", "x y", 10, 100);
        let mid = reply("mid", "x y", 10, 150);
        let slow = reply("slow", "x y", 10, 200);
        let all = vec![fast.clone(), mid.clone(), slow.clone()];

        assert_eq!(ResponseTimeScorer.score(&fast, &all).await, 1.0);
        assert_eq!(ResponseTimeScorer.score(&slow, &all).await, 0.0);
        let mid_score = ResponseTimeScorer.score(&mid, &all).await;
        assert!((mid_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_response_time_ignores_failed_peers() {
        let only_success = reply("ok", "x y", 10, 100);
        let all = vec![only_success.clone(), failed_reply("dead")];
        // One successful peer: degenerate, scores 1.0.
        assert_eq!(ResponseTimeScorer.score(&only_success, &all).await, 1.0);
    }

    #[tokio::test]
    async fn test_token_efficiency_fewer_is_better() {
        let thrifty = reply("thrifty", "x y", 30, 100);
        let verbose = reply("verbose", "x y", 60, 100);
        let all = vec![thrifty.clone(), verbose.clone()];

        assert_eq!(TokenEfficiencyScorer.score(&thrifty, &all).await, 1.0);
        assert_eq!(TokenEfficiencyScorer.score(&verbose, &all).await, 0.0);
    }

    #[tokio::test]
    async fn test_token_efficiency_skips_zero_counts() {
        let counted = reply("counted", "x y", 30, 100);
        let uncounted = reply("uncounted", "x y", 0, 100);
        let all = vec![counted.clone(), uncounted.clone()];
        // Only one peer with a positive count: degenerate.
        assert_eq!(TokenEfficiencyScorer.score(&counted, &all).await, 1.0);
        assert_eq!(TokenEfficiencyScorer.score(&uncounted, &all).await, 1.0);
    }

    #[tokio::test]
    async fn test_consensus_scorer_rewards_agreement() {
        let a = reply("a", "The capital of France is Paris", 30, 100);
        let b = reply("b", "Paris is the capital of France", 30, 100);
        let c = reply("c", "quantum physics dark matter", 30, 100);
        let all = vec![a.clone(), b.clone(), c.clone()];

        let agreeing = ConsensusScorer.score(&a, &all).await;
        let outlier = ConsensusScorer.score(&c, &all).await;
        assert!(agreeing > outlier);
    }

    #[tokio::test]
    async fn test_validation_pass_fraction() {
        use crate::validation::LengthValidator;

        let scorer = ValidationPassScorer::new(vec![
            Arc::new(LengthValidator::new(Some(1), None)),
            Arc::new(LengthValidator::new(Some(1000), None)),
        ]);
        let r = reply("a", "short", 10, 100);
        let all = vec![r.clone()];
        assert_eq!(scorer.score(&r, &all).await, 0.5);
    }

    #[tokio::test]
    async fn test_weighted_scores_stay_in_unit_interval() {
        let scorer = WeightedScorer::standard();
        let replies = vec![
            reply("a", "The capital of France is Paris", 40, 100),
            reply("b", "Paris is the capital of France", 45, 150),
            reply("c", "France's capital is Paris", 30, 200),
        ];
        for r in &replies {
            let (score, breakdown) = scorer.score_detailed(r, &replies).await;
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
            for (name, component) in &breakdown {
                assert!(
                    (0.0..=1.0).contains(component),
                    "{name} component {component} out of range"
                );
            }
            assert_eq!(breakdown.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_weighted_zero_total_weight_scores_zero() {
        let scorer = WeightedScorer::new(vec![
            (Arc::new(ResponseTimeScorer) as Arc<dyn Scorer>, 0.0),
            (Arc::new(TokenEfficiencyScorer) as Arc<dyn Scorer>, 0.0),
        ])
        .expect("zero weights are legal");
        let r = reply("a", "Paris", 30, 100);
        assert_eq!(scorer.score(&r, &[r.clone()]).await, 0.0);
    }

    #[test]
    fn test_weighted_rejects_negative_weight() {
        let err = WeightedScorer::new(vec![(
            Arc::new(ResponseTimeScorer) as Arc<dyn Scorer>,
            -0.5,
        )])
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }
}
