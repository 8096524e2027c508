//! The orchestration pipeline.
//!
//! One pass runs five steps in a fixed order — Enrich, Execute, Validate,
//! Score, Consensus — against a [`PipelineContext`] that is owned by exactly
//! one pass. Each step appends a [`PipelineEvent`]; a terminal error (every
//! provider failing) short-circuits the remaining steps. [`Pipeline::run`]
//! wraps the pass in a retry loop governed by a [`RetryPolicy`], re-running
//! the whole pass from a fresh context on each attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::consensus::{ConsensusOutcome, ConsensusStrategy};
use crate::error::OrchestratorError;
use crate::execution::{ExecutionResult, ExecutionStrategy};
use crate::llm::RetryPolicy;
use crate::llm::provider::Provider;
use crate::llm::rate_limit::RateLimitInfo;
use crate::scoring::{ScoredReply, WeightedScorer};
use crate::validation::{ValidationOutcome, Validator};

/// Failure reason when no provider produced a successful reply.
pub const ERR_ALL_PROVIDERS_FAILED: &str = "All providers failed";

/// The five fixed pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStep {
    Enrichment,
    Execution,
    Validation,
    Scoring,
    Consensus,
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStep::Enrichment => "enrichment",
            PipelineStep::Execution => "execution",
            PipelineStep::Validation => "validation",
            PipelineStep::Scoring => "scoring",
            PipelineStep::Consensus => "consensus",
        };
        f.write_str(name)
    }
}

/// One step's journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    pub step: PipelineStep,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub elapsed: Duration,
}

/// State accumulated by one pipeline pass. Owned by that pass alone.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub execution_result: Option<ExecutionResult>,
    /// Per-provider validation outcomes, in reply order.
    pub validation_outcomes: Vec<(String, Vec<ValidationOutcome>)>,
    pub scored: Vec<ScoredReply>,
    pub consensus_outcome: Option<ConsensusOutcome>,
    /// Terminal error for this pass, when one occurred.
    pub error: Option<String>,
    pub events: Vec<PipelineEvent>,
    /// How many attempts the retry loop spent, including this one.
    pub attempts: u32,
}

impl PipelineContext {
    /// A pass succeeds when it ran to completion without a terminal error.
    /// A consensus miss is not a failure: a best response is still reported.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.consensus_outcome.is_some()
    }

    fn record_event(&mut self, step: PipelineStep, detail: impl Into<String>, started: Instant) {
        let detail = detail.into();
        let elapsed = started.elapsed();
        tracing::debug!(step = %step, %detail, ?elapsed, "pipeline step finished");
        self.events.push(PipelineEvent {
            step,
            detail,
            timestamp: Utc::now(),
            elapsed,
        });
    }

    /// Rate-limit hints from the most recent throttled failure, for the
    /// retry policy.
    fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        let result = self.execution_result.as_ref()?;
        result
            .failed()
            .iter()
            .rev()
            .find_map(|reply| reply.rate_limit_info.clone())
    }
}

/// Fluent configuration for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    prompt: String,
    system_prompt: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    providers: Vec<Arc<Provider>>,
    validators: Vec<Arc<dyn Validator>>,
    scorer: Option<Arc<WeightedScorer>>,
    consensus: Option<ConsensusStrategy>,
    execution: Option<ExecutionStrategy>,
    retry: Option<RetryPolicy>,
}

impl PipelineBuilder {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_providers(mut self, providers: Vec<Arc<Provider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Fixed text prepended to the prompt, joined by a blank line.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Fixed text appended to the prompt, joined by a blank line.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_validators(mut self, validators: Vec<Arc<dyn Validator>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<WeightedScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_consensus(mut self, consensus: ConsensusStrategy) -> Self {
        self.consensus = Some(consensus);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = Some(execution);
        self
    }

    /// Retry the whole pass under this policy; its `max_attempts` is the
    /// attempt budget.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            prompt: self.prompt,
            system_prompt: self.system_prompt,
            prefix: self.prefix,
            suffix: self.suffix,
            providers: self.providers,
            validators: self.validators,
            scorer: self.scorer,
            consensus: self.consensus.unwrap_or(ConsensusStrategy::HighestScore),
            execution: self.execution.unwrap_or(ExecutionStrategy::Parallel),
            retry: self.retry,
        }
    }
}

/// Immutable pipeline configuration; each attempt materialises a fresh
/// [`PipelineContext`] from it.
pub struct Pipeline {
    prompt: String,
    system_prompt: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    providers: Vec<Arc<Provider>>,
    validators: Vec<Arc<dyn Validator>>,
    scorer: Option<Arc<WeightedScorer>>,
    consensus: ConsensusStrategy,
    execution: ExecutionStrategy,
    retry: Option<RetryPolicy>,
}

impl Pipeline {
    pub fn builder(prompt: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(prompt)
    }

    /// Run the pipeline to completion, retrying failed passes within the
    /// policy's attempt budget. Cancellation between attempts aborts the
    /// loop immediately with the last context.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PipelineContext, OrchestratorError> {
        if self.prompt.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }

        let max_attempts = self
            .retry
            .as_ref()
            .map(|policy| policy.max_attempts())
            .unwrap_or(1)
            .max(1);

        let mut attempt = 1u32;
        loop {
            let mut context = self.run_pass(cancel).await?;
            context.attempts = attempt;
            if context.succeeded() || attempt >= max_attempts {
                return Ok(context);
            }

            let Some(policy) = &self.retry else {
                return Ok(context);
            };
            let rate_limit = context.last_rate_limit();
            let Some(delay) = policy.next_delay(attempt, rate_limit.as_ref()) else {
                return Ok(context);
            };

            tracing::warn!(
                attempt,
                ?delay,
                error = context.error.as_deref().unwrap_or(""),
                "pipeline pass failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(context),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One pass over the five steps.
    async fn run_pass(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PipelineContext, OrchestratorError> {
        let mut context = PipelineContext {
            prompt: self.prompt.clone(),
            system_prompt: self.system_prompt.clone(),
            ..Default::default()
        };

        // Enrichment: optional prefix/suffix joined by a blank line.
        if self.prefix.is_some() || self.suffix.is_some() || self.system_prompt.is_some() {
            let started = Instant::now();
            if let Some(prefix) = &self.prefix {
                context.prompt = format!("{prefix}\n\n{}", context.prompt);
            }
            if let Some(suffix) = &self.suffix {
                context.prompt = format!("{}\n\n{suffix}", context.prompt);
            }
            context.record_event(PipelineStep::Enrichment, "prompt enriched", started);
        }

        // Execution.
        let started = Instant::now();
        let result = self
            .execution
            .execute(
                &self.providers,
                &context.prompt,
                context.system_prompt.as_deref(),
                &self.validators,
                cancel,
            )
            .await?;
        let succeeded = result.successful().len();
        let total = result.len();
        context.record_event(
            PipelineStep::Execution,
            format!("{succeeded}/{total} providers succeeded"),
            started,
        );

        if succeeded == 0 {
            context.execution_result = Some(result);
            context.error = Some(ERR_ALL_PROVIDERS_FAILED.to_string());
            return Ok(context);
        }

        let successes: Vec<crate::llm::Reply> =
            result.successful().into_iter().cloned().collect();
        context.execution_result = Some(result);

        // Validation: never fatal on its own.
        if !self.validators.is_empty() {
            let started = Instant::now();
            let mut invalid = 0usize;
            for reply in &successes {
                let mut outcomes = Vec::with_capacity(self.validators.len());
                for validator in &self.validators {
                    let outcome = validator.validate(&reply.content).await;
                    if !outcome.valid {
                        invalid += 1;
                    }
                    outcomes.push(outcome);
                }
                context
                    .validation_outcomes
                    .push((reply.provider_name.clone(), outcomes));
            }
            context.record_event(
                PipelineStep::Validation,
                format!("{invalid} validation failures across {} replies", successes.len()),
                started,
            );
        }

        // Scoring: without a scorer, every reply scores 1.0.
        let started = Instant::now();
        for reply in &successes {
            let (score, breakdown) = match &self.scorer {
                Some(scorer) => scorer.score_detailed(reply, &successes).await,
                None => (1.0, std::collections::HashMap::new()),
            };
            context.scored.push(ScoredReply {
                provider_name: reply.provider_name.clone(),
                content: reply.content.clone(),
                score,
                breakdown,
                response_time: reply.duration,
                total_tokens: reply.total_tokens(),
            });
        }
        context.record_event(
            PipelineStep::Scoring,
            format!("scored {} replies", context.scored.len()),
            started,
        );

        // Consensus.
        let started = Instant::now();
        let outcome = self.consensus.decide(&context.scored);
        context.record_event(
            PipelineStep::Consensus,
            format!(
                "consensus {} with confidence {:.2}",
                if outcome.consensus_reached { "reached" } else { "missed" },
                outcome.confidence
            ),
            started,
        );
        context.consensus_outcome = Some(outcome);

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::config::ModelConfig;
    use crate::error::ProviderError;
    use crate::llm::provider::{Completion, ProviderAdapter};

    struct CountingAdapter {
        config: ModelConfig,
        failures_remaining: AtomicU32,
        response: String,
        calls: Arc<AtomicU32>,
    }

    fn provider(name: &str, failures: u32, response: &str, calls: Arc<AtomicU32>) -> Arc<Provider> {
        Arc::new(Provider::new(Box::new(CountingAdapter {
            config: ModelConfig::new(name, "test-model"),
            failures_remaining: AtomicU32::new(failures),
            response: response.to_string(),
            calls,
        })))
    }

    #[async_trait]
    impl ProviderAdapter for CountingAdapter {
        fn config(&self) -> &ModelConfig {
            &self.config
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn send_request(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let remaining = self.failures_remaining.load(Ordering::Relaxed);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
                return Err(ProviderError::Network("flakey".into()));
            }
            Ok(Completion {
                content: self.response.clone(),
                prompt_tokens: 10,
                completion_tokens: 5,
            })
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_any_step() {
        let pipeline = Pipeline::builder("  ")
            .with_providers(vec![provider("a", 0, "x", Arc::new(AtomicU32::new(0)))])
            .build();
        let err = pipeline.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_journal_events() {
        let pipeline = Pipeline::builder("What is the capital of France?")
            .with_system_prompt("Answer concisely.")
            .with_providers(vec![
                provider("a", 0, "Paris", Arc::new(AtomicU32::new(0))),
                provider("b", 0, "Paris", Arc::new(AtomicU32::new(0))),
            ])
            .with_scorer(Arc::new(WeightedScorer::standard()))
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        assert!(context.succeeded());

        let steps: Vec<PipelineStep> = context.events.iter().map(|e| e.step).collect();
        assert_eq!(
            steps,
            [
                PipelineStep::Enrichment,
                PipelineStep::Execution,
                PipelineStep::Scoring,
                PipelineStep::Consensus,
            ]
        );
        assert_eq!(context.scored.len(), 2);
        assert!(context.consensus_outcome.expect("decided").consensus_reached);
    }

    #[tokio::test]
    async fn test_all_providers_failed_short_circuits() {
        let pipeline = Pipeline::builder("hi")
            .with_providers(vec![
                provider("a", u32::MAX, "never", Arc::new(AtomicU32::new(0))),
                provider("b", u32::MAX, "never", Arc::new(AtomicU32::new(0))),
            ])
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        assert!(!context.succeeded());
        assert_eq!(context.error.as_deref(), Some(ERR_ALL_PROVIDERS_FAILED));
        // Scoring and consensus never ran.
        assert!(context.scored.is_empty());
        assert!(context.consensus_outcome.is_none());
        assert!(
            context
                .events
                .iter()
                .all(|e| e.step == PipelineStep::Execution)
        );
    }

    #[tokio::test]
    async fn test_retry_loop_reruns_whole_pass_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        // Fails on the first pass, succeeds on the second.
        let pipeline = Pipeline::builder("hi")
            .with_providers(vec![provider("flaky", 1, "recovered", calls.clone())])
            .with_retry(RetryPolicy::fixed(Duration::from_millis(5), 3))
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        assert!(context.succeeded());
        assert_eq!(context.attempts, 2);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(
            context
                .consensus_outcome
                .expect("decided")
                .best_content
                .as_deref(),
            Some("recovered")
        );
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = Pipeline::builder("hi")
            .with_providers(vec![provider("dead", u32::MAX, "never", calls.clone())])
            .with_retry(RetryPolicy::fixed(Duration::from_millis(1), 3))
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        assert!(!context.succeeded());
        assert_eq!(context.attempts, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_validation_failures_are_not_fatal() {
        use crate::validation::ContentFilterValidator;

        let pipeline = Pipeline::builder("hi")
            .with_providers(vec![provider("a", 0, "Berlin", Arc::new(AtomicU32::new(0)))])
            .with_validator(Arc::new(ContentFilterValidator::new(
                vec!["paris".into()],
                vec![],
                false,
            )))
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        // The reply failed validation, but scoring and consensus still ran.
        assert!(context.succeeded());
        assert_eq!(context.validation_outcomes.len(), 1);
        assert!(!context.validation_outcomes[0].1[0].valid);
        assert_eq!(context.scored.len(), 1);
    }

    #[tokio::test]
    async fn test_no_scorer_scores_one() {
        let pipeline = Pipeline::builder("hi")
            .with_providers(vec![
                provider("a", 0, "alpha", Arc::new(AtomicU32::new(0))),
                provider("b", 0, "beta", Arc::new(AtomicU32::new(0))),
            ])
            .build();

        let context = pipeline.run(&CancellationToken::new()).await.expect("runs");
        assert!(context.scored.iter().all(|s| s.score == 1.0));
        assert!(context.scored.iter().all(|s| s.breakdown.is_empty()));
    }

    #[tokio::test]
    async fn test_prefix_and_suffix_joined_by_blank_line() {
        struct PromptCapture {
            config: ModelConfig,
            seen: Arc<std::sync::Mutex<Option<String>>>,
        }

        #[async_trait]
        impl ProviderAdapter for PromptCapture {
            fn config(&self) -> &ModelConfig {
                &self.config
            }
            fn is_configured(&self) -> bool {
                true
            }
            async fn send_request(
                &self,
                prompt: &str,
                _system_prompt: Option<&str>,
            ) -> Result<Completion, ProviderError> {
                *self.seen.lock().expect("capture lock") = Some(prompt.to_string());
                Ok(Completion {
                    content: "ok".into(),
                    prompt_tokens: 1,
                    completion_tokens: 1,
                })
            }
        }

        let seen = Arc::new(std::sync::Mutex::new(None));
        let pipeline = Pipeline::builder("core prompt")
            .with_prefix("PREFIX")
            .with_suffix("SUFFIX")
            .with_providers(vec![Arc::new(Provider::new(Box::new(PromptCapture {
                config: ModelConfig::new("capture", "m"),
                seen: seen.clone(),
            })))])
            .build();

        pipeline.run(&CancellationToken::new()).await.expect("runs");
        let prompt = seen.lock().expect("capture lock").clone().expect("captured");
        assert_eq!(prompt, "PREFIX\n\ncore prompt\n\nSUFFIX");
    }
}
