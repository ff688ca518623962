//! Top-set selection and portfolio summary.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::{QualifiedBet, VarianceTag};

/// Average confidence (percent) below which the top set is high risk.
const HIGH_RISK_CONFIDENCE: f64 = 55.0;
/// Average confidence (percent) below which the top set is medium risk.
const MEDIUM_RISK_CONFIDENCE: f64 = 62.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::Low => write!(f, "Low"),
        }
    }
}

/// Result of ranking: what to show and how risky it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub top: Vec<QualifiedBet>,
    pub filtered: Vec<QualifiedBet>,
    pub avg_confidence: f64,
    pub avg_edge: f64,
    pub risk_level: RiskLevel,
}

/// NaN edges sort last.
fn by_edge_desc(a: &QualifiedBet, b: &QualifiedBet) -> Ordering {
    let key = |q: &QualifiedBet| {
        if q.bet.edge_pct.is_nan() {
            f64::NEG_INFINITY
        } else {
            q.bet.edge_pct
        }
    };
    key(b).total_cmp(&key(a))
}

/// Filtered bets that may never be promoted into the top set.
pub fn is_backfill_excluded(q: &QualifiedBet) -> bool {
    let label = q.bet.label.as_str();
    label == "No Bet"
        || label == "Pass"
        || label.to_lowercase().contains("no bet")
        || q.bet.bet_type == "No Bet"
}

/// Rank qualified bets, backfilling the top set from filtered ones up to
/// `top_set_size`.
pub fn rank(bets: Vec<QualifiedBet>, top_set_size: usize) -> Ranking {
    let (mut top, mut filtered): (Vec<_>, Vec<_>) = bets.into_iter().partition(|q| q.is_qualified());
    top.sort_by(by_edge_desc);
    filtered.sort_by(by_edge_desc);

    let mut rest = Vec::with_capacity(filtered.len());
    for q in filtered {
        if top.len() < top_set_size && !is_backfill_excluded(&q) {
            top.push(q);
        } else {
            rest.push(q);
        }
    }

    let (avg_confidence, avg_edge) = averages(&top);
    let risk_level = risk_level(&top, avg_confidence);

    Ranking {
        top,
        filtered: rest,
        avg_confidence,
        avg_edge,
        risk_level,
    }
}

fn averages(top: &[QualifiedBet]) -> (f64, f64) {
    if top.is_empty() {
        return (0.0, 0.0);
    }
    let n = top.len() as f64;
    let conf: f64 = top.iter().map(|q| q.bet.confidence_pct).sum();
    let edge: f64 = top.iter().map(|q| q.bet.edge_pct).sum();
    (conf / n, edge / n)
}

fn risk_level(top: &[QualifiedBet], avg_confidence: f64) -> RiskLevel {
    let any_high = top.iter().any(|q| q.bet.variance_tag == VarianceTag::High);
    if any_high || avg_confidence < HIGH_RISK_CONFIDENCE {
        RiskLevel::High
    } else if avg_confidence < MEDIUM_RISK_CONFIDENCE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
