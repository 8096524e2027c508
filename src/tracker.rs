//! Per-provider performance counters.
//!
//! Updated only by the orchestrator after consensus. Raw counters live
//! here; rates and averages are derived on read so they are always
//! consistent with each other.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

/// Raw counters for one provider.
#[derive(Debug, Clone, Default)]
pub struct PerformanceRecord {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_latency_ms: u64,
    pub total_score: f64,
    pub total_tokens: u64,
    pub wins: u64,
}

/// Derived analytics for one provider, computed from a [`PerformanceRecord`]
/// snapshot at read time.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderAnalytics {
    pub provider_name: String,
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub wins: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub average_score: f64,
    pub win_rate: f64,
    pub avg_tokens: f64,
}

impl ProviderAnalytics {
    fn from_record(provider_name: &str, record: &PerformanceRecord) -> Self {
        let requests = record.total_requests as f64;
        let successes = record.successes as f64;
        Self {
            provider_name: provider_name.to_string(),
            total_requests: record.total_requests,
            successes: record.successes,
            failures: record.failures,
            wins: record.wins,
            success_rate: ratio(successes, requests),
            average_latency_ms: ratio(record.total_latency_ms as f64, successes),
            average_score: ratio(record.total_score, successes),
            win_rate: ratio(record.wins as f64, successes),
            avg_tokens: ratio(record.total_tokens as f64, successes),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Thread-safe collector shared by all orchestrations.
#[derive(Default)]
pub struct PerformanceTracker {
    records: RwLock<HashMap<String, PerformanceRecord>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scored success; `won` marks the consensus winner.
    pub async fn record_success(
        &self,
        provider_name: &str,
        latency: Duration,
        score: f64,
        tokens: u32,
        won: bool,
    ) {
        let mut records = self.records.write().await;
        let record = records.entry(provider_name.to_string()).or_default();
        record.total_requests += 1;
        record.successes += 1;
        record.total_latency_ms += latency.as_millis() as u64;
        record.total_score += score;
        record.total_tokens += tokens as u64;
        if won {
            record.wins += 1;
        }
    }

    /// Record a failed execution entry.
    pub async fn record_failure(&self, provider_name: &str) {
        let mut records = self.records.write().await;
        let record = records.entry(provider_name.to_string()).or_default();
        record.total_requests += 1;
        record.failures += 1;
    }

    /// Analytics for one provider, if it has been seen.
    pub async fn analytics(&self, provider_name: &str) -> Option<ProviderAnalytics> {
        let records = self.records.read().await;
        records
            .get(provider_name)
            .map(|record| ProviderAnalytics::from_record(provider_name, record))
    }

    /// Fresh snapshot of every provider's analytics, sorted by name.
    pub async fn snapshot(&self) -> Vec<ProviderAnalytics> {
        let records = self.records.read().await;
        let mut analytics: Vec<ProviderAnalytics> = records
            .iter()
            .map(|(name, record)| ProviderAnalytics::from_record(name, record))
            .collect();
        analytics.sort_by(|a, b| a.provider_name.cmp(&b.provider_name));
        analytics
    }

    /// Drop all recorded state.
    pub async fn reset(&self) {
        self.records.write().await.clear();
    }
}
