//! Qualification rules.
//!
//! Every rule is evaluated for every bet; a bet is qualified only when no
//! rule fires. The order of `reject_reasons` follows rule order.

use tracing::debug;

use super::Thresholds;
use crate::stream::FightResult;
use crate::types::{CandidateBet, QualifiedBet, VarianceTag};

/// Qualify bets against the thresholds. Pure and deterministic.
pub fn qualify(bets: &[CandidateBet], thresholds: &Thresholds) -> Vec<QualifiedBet> {
    bets.iter()
        .map(|bet| qualify_one(bet, false, thresholds))
        .collect()
}

/// Qualify the bets of streamed fight results. Unlike [`qualify`], this
/// knows which results were priced from placeholder odds.
pub fn qualify_results(results: &[FightResult], thresholds: &Thresholds) -> Vec<QualifiedBet> {
    results
        .iter()
        .map(|r| qualify_one(&r.edge, r.uses_placeholder_odds(), thresholds))
        .collect()
}

pub fn qualify_one(bet: &CandidateBet, placeholder_odds: bool, t: &Thresholds) -> QualifiedBet {
    let mut reasons = Vec::new();

    if t.reject_zero_confidence && bet.confidence_pct == 0.0 {
        reasons.push("Model determined no value/edge found".to_string());
    }

    if bet.simulated_probability < t.min_probability {
        reasons.push(format!(
            "Win probability {}% below {}% threshold",
            fixed(bet.simulated_probability * 100.0, 0),
            fmt_num(t.min_probability * 100.0)
        ));
    }

    if bet.edge_pct < t.min_edge_pct {
        reasons.push(format!(
            "Edge {}% below {}% minimum",
            fixed(bet.edge_pct, 1),
            fmt_num(t.min_edge_pct)
        ));
    }

    let pass_rate = bet.agent_pass_rate();
    if pass_rate < t.min_consensus {
        reasons.push(format!(
            "Agent consensus {}% below {}% threshold",
            fixed(pass_rate * 100.0, 0),
            fmt_num(t.min_consensus * 100.0)
        ));
    }

    if bet.variance_tag == VarianceTag::High
        && bet.confidence_pct / 100.0 < t.high_variance_min_confidence
    {
        reasons.push(format!(
            "High variance blocked: confidence {}% below {}%",
            bet.confidence_pct,
            fmt_num(t.high_variance_min_confidence * 100.0)
        ));
    }

    if t.reject_pass_labels && bet.is_pass_outcome() {
        reasons.push("Model recommends passing on this fight".to_string());
    }

    if t.reject_placeholder_odds && placeholder_odds {
        reasons.push("Odds are a placeholder, not market data".to_string());
    }

    if !reasons.is_empty() {
        debug!(bet_id = %bet.id, label = %bet.label, reasons = reasons.len(), "Bet filtered");
    }
    QualifiedBet::from_reasons(bet.clone(), reasons)
}

/// Fixed-point with ties rounded away from zero, so `62.5` shows as `63`
/// and `0.25` at one place as `0.3`.
pub fn fixed(value: f64, places: usize) -> String {
    let scale = 10f64.powi(places as i32);
    let rounded = if value >= 0.0 {
        (value * scale + 0.5).floor()
    } else {
        -(-value * scale + 0.5).floor()
    };
    format!("{:.*}", places, rounded / scale)
}

/// Shortest decimal form: `55`, `0.5`, `52.5`. Six places absorb float
/// noise such as `0.55 * 100 = 55.00000000000001`.
pub fn fmt_num(value: f64) -> String {
    let s = format!("{value:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
