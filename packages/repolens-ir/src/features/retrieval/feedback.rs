//! Retrieval learning signal
//!
//! Per-query feedback lands in an append-only log; batch retuning runs
//! every N events and may perturb each weight within ±bound before
//! renormalizing. No online updates, so retrieval latency stays flat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::intent::QueryIntent;
use super::ports::Strategy;
use super::weights::WeightProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    /// Explicit thumbs-up, or a click on a result
    Positive,
    /// Explicit thumbs-down, or an abandoned result list
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub intent: QueryIntent,
    pub chunk_id: String,
    /// Strategies that surfaced the chunk the user reacted to
    pub strategies: Vec<Strategy>,
    pub signal: FeedbackSignal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetuneConfig {
    /// Retune after this many accumulated events
    pub batch_size: usize,
    /// Maximum perturbation per weight per retune
    pub max_delta: f64,
    /// Step applied per net signal, before clamping
    pub step: f64,
}

impl Default for RetuneConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_delta: 0.1,
            step: 0.005,
        }
    }
}

/// Append-only feedback log with periodic batch retuning
pub struct FeedbackLog {
    events: Vec<FeedbackEvent>,
    config: RetuneConfig,
    /// Tuned profiles by intent; absent intents use the fixed defaults
    tuned: BTreeMap<QueryIntent, WeightProfile>,
    events_since_retune: usize,
}

impl FeedbackLog {
    pub fn new(config: RetuneConfig) -> Self {
        Self {
            events: Vec::new(),
            config,
            tuned: BTreeMap::new(),
            events_since_retune: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Current profile for an intent: tuned if a retune has run, else the
    /// fixed default
    pub fn profile_for(&self, intent: QueryIntent) -> WeightProfile {
        self.tuned
            .get(&intent)
            .cloned()
            .unwrap_or_else(|| WeightProfile::for_intent(intent))
    }

    /// Append an event; triggers a batch retune when the batch fills
    pub fn record(&mut self, event: FeedbackEvent) {
        self.events.push(event);
        self.events_since_retune += 1;
        if self.events_since_retune >= self.config.batch_size {
            self.retune();
            self.events_since_retune = 0;
        }
    }

    /// Batch retune: per intent, shift weight toward strategies with net
    /// positive signal, clamp the total shift to ±max_delta per weight,
    /// renormalize.
    fn retune(&mut self) {
        let window = &self.events[self.events.len() - self.events_since_retune..];

        let mut net: BTreeMap<QueryIntent, BTreeMap<Strategy, i64>> = BTreeMap::new();
        for event in window {
            let per_intent = net.entry(event.intent).or_default();
            let delta = match event.signal {
                FeedbackSignal::Positive => 1,
                FeedbackSignal::Negative => -1,
            };
            for strategy in &event.strategies {
                *per_intent.entry(*strategy).or_insert(0) += delta;
            }
        }

        for (intent, signals) in net {
            let baseline = WeightProfile::for_intent(intent);
            let mut profile = self.profile_for(intent);
            for (strategy, signal) in signals {
                let shift = (signal as f64 * self.config.step)
                    .clamp(-self.config.max_delta, self.config.max_delta);
                let base = baseline.weight(strategy);
                let current = profile.weights.entry(strategy).or_insert(base);
                // Total drift from the fixed profile stays within ±max_delta
                *current = (*current + shift)
                    .clamp(
                        (base - self.config.max_delta).max(0.0),
                        base + self.config.max_delta,
                    );
            }
            profile.normalize();
            tracing::info!(?intent, "retuned retrieval weights");
            self.tuned.insert(intent, profile);
        }
    }
}

impl Default for FeedbackLog {
    fn default() -> Self {
        Self::new(RetuneConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(intent: QueryIntent, strategies: Vec<Strategy>) -> FeedbackEvent {
        FeedbackEvent {
            intent,
            chunk_id: "c".to_string(),
            strategies,
            signal: FeedbackSignal::Positive,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_retune_before_batch_fills() {
        let mut log = FeedbackLog::new(RetuneConfig {
            batch_size: 10,
            ..Default::default()
        });
        for _ in 0..9 {
            log.record(positive(QueryIntent::CodeSearch, vec![Strategy::Vector]));
        }
        assert_eq!(
            log.profile_for(QueryIntent::CodeSearch),
            WeightProfile::for_intent(QueryIntent::CodeSearch)
        );
    }

    #[test]
    fn test_retune_shifts_toward_positive_strategy() {
        let mut log = FeedbackLog::new(RetuneConfig {
            batch_size: 5,
            max_delta: 0.1,
            step: 0.01,
        });
        for _ in 0..5 {
            log.record(positive(QueryIntent::CodeSearch, vec![Strategy::Graph]));
        }
        let tuned = log.profile_for(QueryIntent::CodeSearch);
        let baseline = WeightProfile::for_intent(QueryIntent::CodeSearch);
        assert!(tuned.weight(Strategy::Graph) > baseline.weight(Strategy::Graph) - 1e-9);
        // Profile stays normalized
        assert!((tuned.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_drift_bounded_by_max_delta() {
        let mut log = FeedbackLog::new(RetuneConfig {
            batch_size: 2,
            max_delta: 0.1,
            step: 1.0, // absurd step; clamping must contain it
        });
        for _ in 0..10 {
            log.record(positive(QueryIntent::SymbolNav, vec![Strategy::Vector]));
        }
        let tuned = log.profile_for(QueryIntent::SymbolNav);
        let baseline = WeightProfile::for_intent(QueryIntent::SymbolNav);
        // Pre-normalization drift is clamped to ±0.1; normalization keeps
        // the ordering sane
        assert!(tuned.weight(Strategy::Vector) <= baseline.weight(Strategy::Vector) + 0.1 + 1e-9);
    }

    #[test]
    fn test_log_is_append_only() {
        let mut log = FeedbackLog::default();
        log.record(positive(QueryIntent::CodeSearch, vec![Strategy::Lexical]));
        log.record(positive(QueryIntent::CodeSearch, vec![Strategy::Lexical]));
        assert_eq!(log.len(), 2);
    }
}
