//! Multi-index fusion retrieval
//!
//! Intent-aware weighted RRF over heterogeneous strategies (lexical,
//! vector, symbol, graph) with consensus boosting and an optional
//! feedback-driven retuning layer.

mod feedback;
mod fusion;
mod intent;
mod ports;
mod weights;

pub use feedback::{FeedbackEvent, FeedbackLog, FeedbackSignal, RetuneConfig};
pub use fusion::{FusionConfig, FusionRetriever, RankedResult, RankedResults};
pub use intent::{classify_intent, QueryIntent};
pub use ports::{IndexDocument, SearchHit, SearchIndex, Strategy};
pub use weights::WeightProfile;
