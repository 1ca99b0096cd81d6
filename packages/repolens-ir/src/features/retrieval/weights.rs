//! Per-intent strategy weight profiles
//!
//! Weights are fixed per intent and sum to 1.0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::intent::QueryIntent;
use super::ports::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub weights: BTreeMap<Strategy, f64>,
}

impl WeightProfile {
    pub fn new(vector: f64, lexical: f64, symbol: f64, graph: f64) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(Strategy::Vector, vector);
        weights.insert(Strategy::Lexical, lexical);
        weights.insert(Strategy::Symbol, symbol);
        weights.insert(Strategy::Graph, graph);
        Self { weights }
    }

    pub fn weight(&self, strategy: Strategy) -> f64 {
        self.weights.get(&strategy).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Scale weights back to sum 1.0
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        }
    }

    /// The fixed profile for an intent
    pub fn for_intent(intent: QueryIntent) -> Self {
        match intent {
            QueryIntent::SymbolNav => Self::new(0.20, 0.20, 0.60, 0.00),
            QueryIntent::CodeSearch => Self::new(0.40, 0.30, 0.20, 0.10),
            QueryIntent::ConceptSearch => Self::new(0.50, 0.20, 0.10, 0.20),
            QueryIntent::FlowTrace => Self::new(0.20, 0.10, 0.30, 0.40),
            QueryIntent::RepoOverview => Self::new(0.30, 0.20, 0.20, 0.30),
        }
    }
}
