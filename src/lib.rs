//! Chorus: multi-provider LLM orchestration with consensus.
//!
//! Fan a single prompt out to several language-model providers, validate
//! and score the replies, and pick one winner by a consensus rule. Use it
//! when a single model's answer is not trustworthy enough on its own: for
//! fallback chains, voting, or objective comparison across providers.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use chorus::config::ModelConfig;
//! use chorus::llm::{Provider, ProviderFactory, ProviderRegistry};
//! use chorus::orchestrator::{OrchestrationOptions, Orchestrator};
//! use chorus::template::PromptLibrary;
//! use chorus::tracker::PerformanceTracker;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ProviderFactory::builtin();
//! let registry = Arc::new(ProviderRegistry::new());
//! for name in ["openai", "anthropic", "ollama"] {
//!     let config = ModelConfig::from_env(name, &name.to_uppercase(), "default-model")?;
//!     if let Some(adapter) = factory.build(name, config) {
//!         registry.register(Arc::new(Provider::new(adapter))).await;
//!     }
//! }
//!
//! let orchestrator = Orchestrator::new(
//!     registry,
//!     Arc::new(PromptLibrary::with_builtins()),
//!     Arc::new(PerformanceTracker::new()),
//! );
//!
//! let outcome = orchestrator
//!     .orchestrate(
//!         "What is the capital of France?",
//!         OrchestrationOptions::default(),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!(
//!     "{} (from {}, confidence {:.2})",
//!     outcome.best_content.unwrap_or_default(),
//!     outcome.best_provider.unwrap_or_default(),
//!     outcome.consensus_confidence,
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consensus;
pub mod error;
pub mod execution;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod scoring;
pub mod template;
pub mod tracker;
pub mod validation;

pub use config::ModelConfig;
pub use consensus::{ConsensusOutcome, ConsensusStrategy};
pub use error::{ConfigError, OrchestratorError, ProviderError};
pub use execution::{ExecutionResult, ExecutionStrategy, FallbackTriggers};
pub use llm::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Provider, ProviderAdapter,
    ProviderFactory, ProviderRegistry, RateLimitInfo, Reply, RetryPolicy,
};
pub use orchestrator::{OrchestrationOptions, OrchestrationOutcome, Orchestrator};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineContext, PipelineEvent, PipelineStep};
pub use scoring::{ScoredReply, Scorer, WeightedScorer};
pub use template::{PromptLibrary, PromptTemplate};
pub use tracker::{PerformanceTracker, ProviderAnalytics};
pub use validation::{ValidationOutcome, Validator};
