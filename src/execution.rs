//! Provider invocation strategies.
//!
//! Parallel fans out to every provider at once; Sequential walks them in
//! order until one succeeds; Fallback walks them in order but only advances
//! past failures the configured trigger mask permits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::llm::Reply;
use crate::llm::provider::Provider;
use crate::validation::Validator;

/// Bitmask of failure classes that advance a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackTriggers(u8);

impl FallbackTriggers {
    pub const NONE: FallbackTriggers = FallbackTriggers(0);
    /// Failure reason contains "timed out" (case-insensitive).
    pub const TIMEOUT: FallbackTriggers = FallbackTriggers(1);
    /// A successful reply that a validator rejects.
    pub const VALIDATION_FAILURE: FallbackTriggers = FallbackTriggers(2);
    /// Any failure that is not a timeout.
    pub const EXCEPTION: FallbackTriggers = FallbackTriggers(4);
    pub const ALL: FallbackTriggers = FallbackTriggers(7);

    pub fn contains(self, other: FallbackTriggers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for FallbackTriggers {
    type Output = FallbackTriggers;

    fn bitor(self, rhs: FallbackTriggers) -> FallbackTriggers {
        FallbackTriggers(self.0 | rhs.0)
    }
}

/// How a set of providers is invoked.
#[derive(Debug, Clone)]
pub enum ExecutionStrategy {
    /// All providers concurrently; one failure does not cancel the rest.
    Parallel,
    /// In order, stopping at the first success.
    Sequential,
    /// In order, advancing only past failures the trigger mask permits.
    Fallback { triggers: FallbackTriggers },
}

/// Replies keyed by provider name in invocation order, plus the wall-clock
/// span of the whole strategy run. Duplicate names collapse, last writer
/// wins, keeping the original position.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    entries: Vec<Reply>,
    pub duration: Duration,
}

impl ExecutionResult {
    fn insert(&mut self, reply: Reply) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.provider_name == reply.provider_name)
        {
            Some(existing) => *existing = reply,
            None => self.entries.push(reply),
        }
    }

    /// All replies, in provider-invocation order.
    pub fn replies(&self) -> &[Reply] {
        &self.entries
    }

    pub fn get(&self, provider_name: &str) -> Option<&Reply> {
        self.entries
            .iter()
            .find(|r| r.provider_name == provider_name)
    }

    pub fn successful(&self) -> Vec<&Reply> {
        self.entries.iter().filter(|r| r.success).collect()
    }

    pub fn failed(&self) -> Vec<&Reply> {
        self.entries.iter().filter(|r| !r.success).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExecutionStrategy {
    /// Invoke `providers` on `prompt` according to the strategy.
    ///
    /// `validators` only matter to the Fallback strategy's
    /// `VALIDATION_FAILURE` trigger. An empty provider slice is an argument
    /// error.
    pub async fn execute(
        &self,
        providers: &[Arc<Provider>],
        prompt: &str,
        system_prompt: Option<&str>,
        validators: &[Arc<dyn Validator>],
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "provider list must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let mut result = ExecutionResult::default();

        match self {
            ExecutionStrategy::Parallel => {
                let calls = providers
                    .iter()
                    .map(|provider| provider.generate(prompt, system_prompt, cancel));
                for reply in join_all(calls).await {
                    result.insert(reply?);
                }
            }
            ExecutionStrategy::Sequential => {
                for provider in providers {
                    let reply = provider.generate(prompt, system_prompt, cancel).await?;
                    let success = reply.success;
                    result.insert(reply);
                    if success {
                        break;
                    }
                }
            }
            ExecutionStrategy::Fallback { triggers } => {
                for provider in providers {
                    let reply = provider.generate(prompt, system_prompt, cancel).await?;
                    if reply.success {
                        let advance = triggers.contains(FallbackTriggers::VALIDATION_FAILURE)
                            && !validators.is_empty()
                            && any_validator_rejects(validators, &reply.content).await;
                        result.insert(reply);
                        if !advance {
                            break;
                        }
                        tracing::debug!(
                            provider = provider.name(),
                            "fallback advancing past reply rejected by validation"
                        );
                    } else {
                        let trigger = failure_trigger(&reply);
                        let advance = triggers.contains(trigger);
                        tracing::debug!(
                            provider = provider.name(),
                            error = reply.error_message(),
                            advance,
                            "fallback provider failed"
                        );
                        result.insert(reply);
                        if !advance {
                            // A failure the mask does not cover ends the chain.
                            break;
                        }
                    }
                }
            }
        }

        result.duration = started.elapsed();
        Ok(result)
    }
}

/// Classify a failed reply for the trigger mask.
fn failure_trigger(reply: &Reply) -> FallbackTriggers {
    if reply.error_message().to_lowercase().contains("timed out") {
        FallbackTriggers::TIMEOUT
    } else {
        FallbackTriggers::EXCEPTION
    }
}

async fn any_validator_rejects(validators: &[Arc<dyn Validator>], content: &str) -> bool {
    for validator in validators {
        if !validator.validate(content).await.valid {
            return true;
        }
    }
    false
}
