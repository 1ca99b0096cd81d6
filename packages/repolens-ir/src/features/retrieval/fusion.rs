//! Intent-weighted Reciprocal Rank Fusion with consensus boosting
//!
//! score(chunk) = Σ_s w_s / (k + r_s), boosted by 1 + c·√(n−1) when the
//! chunk appears in n ≥ 2 strategies. Rank-based scoring keeps the fusion
//! scale-independent: no strategy dominates by producing larger raw
//! scores. The final ordering is deterministic (chunk id tie-break).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::intent::{classify_intent, QueryIntent};
use super::ports::{SearchHit, Strategy};
use super::weights::WeightProfile;

#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF smoothing constant
    pub k: f64,
    /// Consensus boost coefficient
    pub consensus_c: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            consensus_c: 0.15,
        }
    }
}

/// One fused result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: String,
    pub score: f64,
    /// Strategies that surfaced this chunk
    pub strategies: Vec<Strategy>,
    /// Best (lowest) rank across strategies
    pub best_rank: usize,
}

/// Fused, ranked results with the intent that shaped them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResults {
    pub intent: QueryIntent,
    pub results: Vec<RankedResult>,
    /// Strategies that contributed result lists
    pub strategies_used: Vec<Strategy>,
    /// Strategies that failed and were skipped (graceful degradation)
    pub strategies_failed: Vec<Strategy>,
}

pub struct FusionRetriever {
    config: FusionConfig,
}

impl FusionRetriever {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Classify the query (unless a hint is given) and fuse the
    /// per-strategy result lists under that intent's weight profile.
    pub fn fuse(
        &self,
        query: &str,
        intent_hint: Option<QueryIntent>,
        per_strategy: &[(Strategy, Vec<SearchHit>)],
        failed: &[Strategy],
    ) -> RankedResults {
        let intent = intent_hint.unwrap_or_else(|| classify_intent(query));
        let profile = WeightProfile::for_intent(intent);
        self.fuse_with_profile(intent, &profile, per_strategy, failed)
    }

    pub fn fuse_with_profile(
        &self,
        intent: QueryIntent,
        profile: &WeightProfile,
        per_strategy: &[(Strategy, Vec<SearchHit>)],
        failed: &[Strategy],
    ) -> RankedResults {
        if per_strategy.is_empty() {
            tracing::warn!("all retrieval strategies failed; returning empty results");
            return RankedResults {
                intent,
                results: Vec::new(),
                strategies_used: Vec::new(),
                strategies_failed: failed.to_vec(),
            };
        }

        struct Accum {
            score: f64,
            strategies: Vec<Strategy>,
            best_rank: usize,
        }
        // BTreeMap keeps accumulation order independent of input order
        let mut accum: BTreeMap<String, Accum> = BTreeMap::new();

        for (strategy, hits) in per_strategy {
            let weight = profile.weight(*strategy);
            for hit in hits {
                let contribution = weight / (self.config.k + hit.rank as f64);
                let entry = accum.entry(hit.chunk_id.clone()).or_insert(Accum {
                    score: 0.0,
                    strategies: Vec::new(),
                    best_rank: usize::MAX,
                });
                entry.score += contribution;
                if !entry.strategies.contains(strategy) {
                    entry.strategies.push(*strategy);
                }
                entry.best_rank = entry.best_rank.min(hit.rank);
            }
        }

        let mut results: Vec<RankedResult> = accum
            .into_iter()
            .map(|(chunk_id, mut entry)| {
                let n = entry.strategies.len();
                let boost = if n >= 2 {
                    1.0 + self.config.consensus_c * ((n - 1) as f64).sqrt()
                } else {
                    1.0
                };
                entry.strategies.sort();
                RankedResult {
                    chunk_id,
                    score: entry.score * boost,
                    strategies: entry.strategies,
                    best_rank: entry.best_rank,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        let mut strategies_used: Vec<Strategy> =
            per_strategy.iter().map(|(s, _)| *s).collect();
        strategies_used.sort();

        RankedResults {
            intent,
            results,
            strategies_used,
            strategies_failed: failed.to_vec(),
        }
    }
}

impl Default for FusionRetriever {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: &str, rank: usize, strategy: Strategy) -> SearchHit {
        SearchHit {
            chunk_id: chunk_id.to_string(),
            rank,
            strategy,
        }
    }

    #[test]
    fn test_symbol_nav_scenario() {
        // "RetrieverConfig": symbol ranks config.py at 0, vector at 3,
        // lexical at 1
        let retriever = FusionRetriever::default();
        let per_strategy = vec![
            (Strategy::Symbol, vec![hit("config.py", 0, Strategy::Symbol)]),
            (
                Strategy::Vector,
                vec![
                    hit("competitor.py", 0, Strategy::Vector),
                    hit("a.py", 1, Strategy::Vector),
                    hit("b.py", 2, Strategy::Vector),
                    hit("config.py", 3, Strategy::Vector),
                ],
            ),
            (
                Strategy::Lexical,
                vec![
                    hit("other.py", 0, Strategy::Lexical),
                    hit("config.py", 1, Strategy::Lexical),
                ],
            ),
        ];

        let ranked = retriever.fuse("RetrieverConfig", None, &per_strategy, &[]);
        assert_eq!(ranked.intent, QueryIntent::SymbolNav);
        assert_eq!(ranked.results[0].chunk_id, "config.py");

        let top = &ranked.results[0];
        // score = 0.6/60 + 0.2/63 + 0.2/61 ≈ 0.0164, boosted by
        // 1 + 0.15·√2 ≈ 1.212 → ≈ 0.0199
        assert!((top.score - 0.0199).abs() < 0.0005, "score {}", top.score);
        assert_eq!(top.strategies.len(), 3);

        // Vector-only competitor at rank 0 scores 0.2/60 with no boost
        let competitor = ranked
            .results
            .iter()
            .find(|r| r.chunk_id == "competitor.py")
            .unwrap();
        assert!((competitor.score - 0.2 / 60.0).abs() < 1e-9);
        assert!(top.score > competitor.score);
    }

    #[test]
    fn test_fusion_deterministic() {
        let retriever = FusionRetriever::default();
        let per_strategy = vec![
            (
                Strategy::Vector,
                vec![hit("a", 0, Strategy::Vector), hit("b", 1, Strategy::Vector)],
            ),
            (
                Strategy::Lexical,
                vec![hit("b", 0, Strategy::Lexical), hit("a", 1, Strategy::Lexical)],
            ),
        ];
        let first = retriever.fuse("query", None, &per_strategy, &[]);
        let second = retriever.fuse("query", None, &per_strategy, &[]);
        assert_eq!(first.results, second.results);
    }

    #[test]
    fn test_tie_break_by_chunk_id() {
        let retriever = FusionRetriever::default();
        // Identical contributions for both chunks
        let per_strategy = vec![(
            Strategy::Vector,
            vec![hit("zeta", 0, Strategy::Vector), hit("alpha", 0, Strategy::Vector)],
        )];
        let ranked = retriever.fuse("anything here", None, &per_strategy, &[]);
        assert_eq!(ranked.results[0].chunk_id, "alpha");
    }

    #[test]
    fn test_consensus_boost_shape() {
        let config = FusionConfig::default();
        let boost2 = 1.0 + config.consensus_c * 1.0_f64.sqrt();
        let boost4 = 1.0 + config.consensus_c * 3.0_f64.sqrt();
        // √ growth: going 2→4 strategies gains less than 2×
        assert!(boost4 / boost2 < 2.0);
    }

    #[test]
    fn test_graceful_degradation_records_failures() {
        let retriever = FusionRetriever::default();
        let per_strategy = vec![(Strategy::Lexical, vec![hit("a", 0, Strategy::Lexical)])];
        let ranked = retriever.fuse(
            "query terms",
            None,
            &per_strategy,
            &[Strategy::Vector, Strategy::Graph],
        );
        assert_eq!(ranked.results.len(), 1);
        assert_eq!(ranked.strategies_failed, vec![Strategy::Vector, Strategy::Graph]);
    }

    #[test]
    fn test_all_strategies_failed_returns_empty() {
        let retriever = FusionRetriever::default();
        let ranked = retriever.fuse("query", None, &[], &Strategy::ALL);
        assert!(ranked.results.is_empty());
        assert_eq!(ranked.strategies_failed.len(), 4);
    }

    #[test]
    fn test_zero_weight_strategy_contributes_nothing() {
        // symbol_nav gives graph weight 0.0
        let retriever = FusionRetriever::default();
        let per_strategy = vec![(Strategy::Graph, vec![hit("g", 0, Strategy::Graph)])];
        let ranked = retriever.fuse("SymbolName", None, &per_strategy, &[]);
        assert_eq!(ranked.intent, QueryIntent::SymbolNav);
        assert_eq!(ranked.results[0].score, 0.0);
    }
}
