//! The orchestrator facade.
//!
//! Resolves providers from the registry, builds the weighted scorer from a
//! name→weight map, runs the pipeline, and settles the results into the
//! performance tracker. The two entry points are [`Orchestrator::orchestrate`]
//! (inline options) and [`Orchestrator::orchestrate_from_template`] (render a
//! registered template first).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::consensus::ConsensusStrategy;
use crate::error::OrchestratorError;
use crate::execution::ExecutionStrategy;
use crate::llm::RetryPolicy;
use crate::llm::provider::Provider;
use crate::llm::registry::ProviderRegistry;
use crate::pipeline::{Pipeline, PipelineContext, PipelineEvent};
use crate::scoring::{
    self, ConsensusScorer, ResponseTimeScorer, ScoredReply, Scorer, TokenEfficiencyScorer,
    WeightedScorer,
};
use crate::template::PromptLibrary;
use crate::tracker::PerformanceTracker;

/// Failure reason when provider resolution comes up empty.
pub const ERR_NO_CONFIGURED_PROVIDERS: &str = "No configured providers available";

const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const DEFAULT_RETRY_CAP: Duration = Duration::from_secs(30);

/// Inline options for one orchestration. Everything is optional; the
/// defaults are Parallel execution, HighestScore consensus, and the
/// standard equal scorer weights.
#[derive(Default, Clone)]
pub struct OrchestrationOptions {
    /// Execution strategy; Fallback consults `fallback_order`.
    pub strategy: Option<ExecutionStrategy>,
    /// Explicit consensus strategy. Wins over `quorum` and
    /// `similarity_threshold`.
    pub consensus: Option<ConsensusStrategy>,
    /// Provider names for the Fallback strategy, tried in this order.
    pub fallback_order: Vec<String>,
    /// Agreement count for a Quorum consensus.
    pub quorum: Option<usize>,
    /// Similarity threshold for MajorityVote/Quorum clustering.
    pub similarity_threshold: Option<f64>,
    /// System prompt passed to every provider.
    pub system_prompt: Option<String>,
    /// Scorer name → weight. Known names: `ResponseTime`, `Consensus`,
    /// `TokenEfficiency`.
    pub weights: Option<HashMap<String, f64>>,
    /// Attempt budget for the outer retry loop.
    pub max_attempts: Option<u32>,
    /// Retry policy override; defaults to rate-limit-aware backoff.
    pub retry: Option<RetryPolicy>,
}

/// One failed execution entry, surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// The consumer-facing result of one orchestration.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutcome {
    pub success: bool,
    pub best_content: Option<String>,
    pub best_provider: Option<String>,
    pub best_score: f64,
    pub consensus_reached: bool,
    pub consensus_confidence: f64,
    pub agreement_count: usize,
    pub total_models: usize,
    pub dissenting_providers: Vec<String>,
    pub all_scored: Vec<ScoredReply>,
    pub execution_time: Duration,
    pub failure_reason: Option<String>,
    pub failures: Vec<ProviderFailure>,
    pub pipeline_events: Vec<PipelineEvent>,
}

impl OrchestrationOutcome {
    fn failed(reason: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: false,
            best_content: None,
            best_provider: None,
            best_score: 0.0,
            consensus_reached: false,
            consensus_confidence: 0.0,
            agreement_count: 0,
            total_models: 0,
            dissenting_providers: Vec::new(),
            all_scored: Vec::new(),
            execution_time,
            failure_reason: Some(reason.into()),
            failures: Vec::new(),
            pipeline_events: Vec::new(),
        }
    }

    fn from_context(context: PipelineContext, execution_time: Duration) -> Self {
        let failures: Vec<ProviderFailure> = context
            .execution_result
            .as_ref()
            .map(|result| {
                result
                    .failed()
                    .iter()
                    .map(|reply| ProviderFailure {
                        provider: reply.provider_name.clone(),
                        error: reply.error_message().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let success = context.succeeded();
        let failure_reason = context.error.clone();
        let events = context.events;

        match context.consensus_outcome {
            Some(outcome) => Self {
                success,
                best_content: outcome.best_content,
                best_provider: outcome.best_provider,
                best_score: outcome.best_score,
                consensus_reached: outcome.consensus_reached,
                consensus_confidence: outcome.confidence,
                agreement_count: outcome.agreement_count,
                total_models: outcome.total_models,
                dissenting_providers: outcome.dissenting_providers,
                all_scored: outcome.all_scored,
                execution_time,
                failure_reason,
                failures,
                pipeline_events: events,
            },
            None => Self {
                failures,
                pipeline_events: events,
                ..Self::failed(
                    failure_reason.unwrap_or_else(|| "pipeline did not complete".to_string()),
                    execution_time,
                )
            },
        }
    }
}

/// Facade over registry, template library, pipeline and tracker.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    library: Arc<PromptLibrary>,
    tracker: Arc<PerformanceTracker>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        library: Arc<PromptLibrary>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            registry,
            library,
            tracker,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn library(&self) -> &Arc<PromptLibrary> {
        &self.library
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Run one orchestration with inline options.
    pub async fn orchestrate(
        &self,
        prompt: &str,
        options: OrchestrationOptions,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationOutcome, OrchestratorError> {
        if prompt.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }
        let started = Instant::now();

        let execution = options
            .strategy
            .clone()
            .unwrap_or(ExecutionStrategy::Parallel);
        let providers = self.resolve_providers(&execution, &options).await;
        if providers.is_empty() {
            tracing::warn!("orchestration aborted: no providers resolved");
            return Ok(OrchestrationOutcome::failed(
                ERR_NO_CONFIGURED_PROVIDERS,
                started.elapsed(),
            ));
        }

        let scorer = match &options.weights {
            Some(weights) => build_weighted_scorer(weights)?,
            None => WeightedScorer::standard(),
        };
        let consensus = resolve_consensus(&options)?;
        let retry = resolve_retry(&options);

        let mut builder = Pipeline::builder(prompt)
            .with_providers(providers)
            .with_execution(execution)
            .with_consensus(consensus)
            .with_scorer(Arc::new(scorer));
        if let Some(system_prompt) = &options.system_prompt {
            builder = builder.with_system_prompt(system_prompt.clone());
        }
        if let Some(retry) = retry {
            builder = builder.with_retry(retry);
        }

        let context = builder.build().run(cancel).await?;
        let outcome = OrchestrationOutcome::from_context(context, started.elapsed());

        if outcome.success {
            self.settle_tracker(&outcome).await;
        }
        tracing::info!(
            success = outcome.success,
            best_provider = outcome.best_provider.as_deref().unwrap_or(""),
            confidence = outcome.consensus_confidence,
            elapsed = ?outcome.execution_time,
            "orchestration finished"
        );
        Ok(outcome)
    }

    /// Render a registered template, then orchestrate the result. The
    /// template's system prompt applies unless the options carry their own.
    pub async fn orchestrate_from_template(
        &self,
        template_name: &str,
        variables: &HashMap<String, String>,
        mut options: OrchestrationOptions,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationOutcome, OrchestratorError> {
        let template = self
            .library
            .get(template_name)
            .ok_or_else(|| OrchestratorError::UnknownTemplate(template_name.to_string()))?;
        let rendered = template.render(variables);
        if options.system_prompt.is_none() {
            options.system_prompt = rendered.system_prompt;
        }
        self.orchestrate(&rendered.user_prompt, options, cancel).await
    }

    /// Fallback resolves by the caller's name list, in the caller's order;
    /// everything else takes the configured subset in registry order.
    async fn resolve_providers(
        &self,
        execution: &ExecutionStrategy,
        options: &OrchestrationOptions,
    ) -> Vec<Arc<Provider>> {
        if matches!(execution, ExecutionStrategy::Fallback { .. })
            && !options.fallback_order.is_empty()
        {
            let mut providers = Vec::with_capacity(options.fallback_order.len());
            let mut seen: Vec<String> = Vec::new();
            for name in &options.fallback_order {
                let key = name.to_lowercase();
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                if let Some(provider) = self.registry.get(name).await {
                    providers.push(provider);
                } else {
                    tracing::warn!(provider = %name, "fallback order names unknown provider");
                }
            }
            providers
        } else {
            self.registry.configured().await
        }
    }

    /// Each scored reply contributes a success record (`won` for the
    /// winner); each failed execution entry contributes a failure record.
    async fn settle_tracker(&self, outcome: &OrchestrationOutcome) {
        for scored in &outcome.all_scored {
            let won = outcome.best_provider.as_deref() == Some(scored.provider_name.as_str());
            self.tracker
                .record_success(
                    &scored.provider_name,
                    scored.response_time,
                    scored.score,
                    scored.total_tokens,
                    won,
                )
                .await;
        }
        for failure in &outcome.failures {
            self.tracker.record_failure(&failure.provider).await;
        }
    }
}

/// Build a weighted scorer from a name→weight map over the known built-ins.
fn build_weighted_scorer(
    weights: &HashMap<String, f64>,
) -> Result<WeightedScorer, OrchestratorError> {
    let mut components: Vec<(Arc<dyn Scorer>, f64)> = Vec::with_capacity(weights.len());
    // Stable component order regardless of map iteration order.
    let mut names: Vec<&String> = weights.keys().collect();
    names.sort();
    for name in names {
        let weight = weights[name];
        let scorer: Arc<dyn Scorer> = match name.as_str() {
            scoring::RESPONSE_TIME => Arc::new(ResponseTimeScorer),
            scoring::CONSENSUS => Arc::new(ConsensusScorer),
            scoring::TOKEN_EFFICIENCY => Arc::new(TokenEfficiencyScorer),
            unknown => return Err(OrchestratorError::UnknownScorer(unknown.to_string())),
        };
        components.push((scorer, weight));
    }
    WeightedScorer::new(components)
}

fn resolve_consensus(
    options: &OrchestrationOptions,
) -> Result<ConsensusStrategy, OrchestratorError> {
    if let Some(consensus) = &options.consensus {
        return Ok(consensus.clone());
    }
    if let Some(required) = options.quorum {
        return ConsensusStrategy::quorum(
            required,
            options
                .similarity_threshold
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        );
    }
    if let Some(threshold) = options.similarity_threshold {
        return Ok(ConsensusStrategy::MajorityVote { threshold });
    }
    Ok(ConsensusStrategy::HighestScore)
}

fn resolve_retry(options: &OrchestrationOptions) -> Option<RetryPolicy> {
    if let Some(retry) = &options.retry {
        return Some(retry.clone());
    }
    match options.max_attempts {
        Some(attempts) if attempts > 1 => Some(RetryPolicy::rate_limit_aware(
            DEFAULT_RETRY_BASE,
            DEFAULT_RETRY_CAP,
            attempts,
        )),
        _ => None,
    }
}
