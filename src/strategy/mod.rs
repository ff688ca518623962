//! Qualification and ranking of candidate bets.
//!
//! [`rules`] decides which bets pass the thresholds; [`ranking`] orders
//! them, backfills the top set, and summarizes risk.

pub mod ranking;
pub mod rules;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::stream::FightResult;
use crate::types::{CandidateBet, QualifiedBet};
pub use ranking::{rank, Ranking, RiskLevel};
pub use rules::{qualify, qualify_results};

// ---------------------------------------------------------------------------
// Thresholds (defaults; overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Every knob the qualification rules read. Loaded once and passed down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum simulated win probability (0-1).
    pub min_probability: f64,
    /// Minimum edge, in percent.
    pub min_edge_pct: f64,
    /// Minimum fraction of agents signalling `pass` (0-1).
    pub min_consensus: f64,
    /// High-variance bets need at least this confidence (0-1).
    pub high_variance_min_confidence: f64,
    pub reject_zero_confidence: bool,
    pub reject_pass_labels: bool,
    pub reject_placeholder_odds: bool,
    pub top_set_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_probability: 0.55,
            min_edge_pct: 0.5,
            min_consensus: 0.70,
            high_variance_min_confidence: 0.55,
            reject_zero_confidence: false,
            reject_pass_labels: false,
            reject_placeholder_odds: false,
            top_set_size: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// What the presentation layer receives for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Every bet with its verdict, in input order.
    pub bets: Vec<QualifiedBet>,
    pub qualified_count: usize,
    pub filtered_count: usize,
    #[serde(flatten)]
    pub ranking: Ranking,
}

/// Qualify then rank raw candidate bets.
pub fn recommend(bets: &[CandidateBet], thresholds: &Thresholds) -> Recommendation {
    build(qualify(bets, thresholds), thresholds)
}

/// Qualify then rank streamed fight results, honouring odds provenance.
pub fn recommend_results(results: &[FightResult], thresholds: &Thresholds) -> Recommendation {
    build(qualify_results(results, thresholds), thresholds)
}

fn build(bets: Vec<QualifiedBet>, thresholds: &Thresholds) -> Recommendation {
    let qualified_count = bets.iter().filter(|q| q.is_qualified()).count();
    let filtered_count = bets.len() - qualified_count;
    let ranking = rank(bets.clone(), thresholds.top_set_size);

    info!(
        qualified = qualified_count,
        filtered = filtered_count,
        top = ranking.top.len(),
        avg_edge = ranking.avg_edge,
        risk = %ranking.risk_level,
        "Recommendation built"
    );

    Recommendation {
        bets,
        qualified_count,
        filtered_count,
        ranking,
    }
}
