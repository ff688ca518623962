//! Shared types for the MAFS pipeline.
//!
//! These types form the data model used across the odds, stream and
//! strategy modules. Wire names follow the JSON emitted by the simulation
//! job so that payloads deserialize without an intermediate layer.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::odds::convert;

// ---------------------------------------------------------------------------
// Matchup
// ---------------------------------------------------------------------------

/// Two competitors on a fight card. Order matters for display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Matchup {
    pub fighter_a: String,
    pub fighter_b: String,
}

impl Matchup {
    pub fn new(fighter_a: impl Into<String>, fighter_b: impl Into<String>) -> Self {
        Self {
            fighter_a: fighter_a.into(),
            fighter_b: fighter_b.into(),
        }
    }

    /// Parse a display string such as `"Jon Jones vs. Stipe Miocic"`.
    ///
    /// The separator is matched case-insensitively; returns `None` when
    /// either side is blank.
    pub fn parse(display: &str) -> Option<Self> {
        // ASCII lowercasing keeps byte offsets valid for slicing `display`.
        let lower = display.to_ascii_lowercase();
        for sep in [" vs. ", " vs "] {
            if let Some(pos) = lower.find(sep) {
                let a = display[..pos].trim();
                let b = display[pos + sep.len()..].trim();
                if a.is_empty() || b.is_empty() {
                    return None;
                }
                return Some(Self::new(a, b));
            }
        }
        None
    }
}

impl fmt::Display for Matchup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.fighter_a, self.fighter_b)
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Which cascade tier produced a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Database,
    External,
    Placeholder,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Database => write!(f, "database"),
            SourceTier::External => write!(f, "external"),
            SourceTier::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Over/under rounds line with American prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub line: f64,
    pub over: i32,
    pub under: i32,
}

/// A resolved market quote for one matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub moneyline_a: i32,
    pub moneyline_b: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    pub source_tier: SourceTier,
    /// Free-form origin, e.g. `"database:DraftKings"` or `"fanduel"`.
    pub provenance: String,
}

impl fmt::Display for OddsQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} [{}: {}]",
            convert::format_american(self.moneyline_a),
            convert::format_american(self.moneyline_b),
            self.source_tier,
            self.provenance,
        )?;
        if let Some(t) = &self.totals {
            write!(
                f,
                " O/U {} ({}/{})",
                t.line,
                convert::format_american(t.over),
                convert::format_american(t.under)
            )?;
        }
        Ok(())
    }
}

impl OddsQuote {
    /// Implied win probabilities `(a, b)` from the posted moneylines (vig included).
    pub fn implied_probabilities(&self) -> (f64, f64) {
        (
            convert::implied_probability(self.moneyline_a),
            convert::implied_probability(self.moneyline_b),
        )
    }

    /// Whether the quote was fabricated rather than observed in a market.
    pub fn is_synthetic(&self) -> bool {
        self.source_tier == SourceTier::Placeholder
    }
}

// ---------------------------------------------------------------------------
// Candidate bets
// ---------------------------------------------------------------------------

/// Verdict of one upstream analysis agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Pass,
    Neutral,
    Fail,
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "pass" => Signal::Pass,
            "fail" => Signal::Fail,
            _ => Signal::Neutral,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    pub name: String,
    pub signal: Signal,
    #[serde(rename = "desc", default, deserialize_with = "null_as_default")]
    pub description: String,
}

/// Coarse volatility class attached to a candidate bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceTag {
    Low,
    #[default]
    Medium,
    High,
}

impl<'de> Deserialize<'de> for VarianceTag {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(match raw.trim().to_lowercase().as_str() {
            "low" => VarianceTag::Low,
            "high" => VarianceTag::High,
            _ => VarianceTag::Medium,
        })
    }
}

impl fmt::Display for VarianceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarianceTag::Low => write!(f, "low"),
            VarianceTag::Medium => write!(f, "medium"),
            VarianceTag::High => write!(f, "high"),
        }
    }
}

/// One simulated betting outcome, as emitted by the simulation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBet {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub label: String,
    #[serde(rename = "bet_type", default, deserialize_with = "null_as_default")]
    pub bet_type: String,
    #[serde(
        rename = "odds_american",
        default,
        deserialize_with = "american_odds",
        serialize_with = "american_odds_out"
    )]
    pub american_odds: Option<i32>,
    #[serde(rename = "P_sim")]
    pub simulated_probability: f64,
    #[serde(rename = "P_imp", default)]
    pub implied_probability: f64,
    pub edge_pct: f64,
    #[serde(rename = "confidencePct", default)]
    pub confidence_pct: f64,
    #[serde(rename = "varianceTag", default)]
    pub variance_tag: VarianceTag,
    #[serde(rename = "agentSignals", default, deserialize_with = "null_as_default")]
    pub agent_signals: Vec<AgentSignal>,
    #[serde(rename = "reason", default, deserialize_with = "null_as_default")]
    pub rationale: String,
}

impl fmt::Display for CandidateBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) P_sim={:.0}% edge={:.1}% conf={:.0}% var={}",
            self.label,
            self.american_odds
                .map(convert::format_american)
                .unwrap_or_else(|| "N/A".to_string()),
            self.simulated_probability * 100.0,
            self.edge_pct,
            self.confidence_pct,
            self.variance_tag,
        )
    }
}

impl CandidateBet {
    /// Fraction of agent signals that voted `pass`; 0 with no signals.
    pub fn agent_pass_rate(&self) -> f64 {
        if self.agent_signals.is_empty() {
            return 0.0;
        }
        let passes = self
            .agent_signals
            .iter()
            .filter(|s| s.signal == Signal::Pass)
            .count();
        passes as f64 / self.agent_signals.len() as f64
    }

    /// Whether the model itself recommends sitting this fight out.
    pub fn is_pass_outcome(&self) -> bool {
        self.label == "No Bet" || self.label == "Pass" || self.bet_type == "No Bet"
    }

    /// Helper to build a test bet with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, p_sim: f64, edge_pct: f64) -> Self {
        CandidateBet {
            id: id.to_string(),
            label: format!("Bet {id}"),
            bet_type: "Moneyline".to_string(),
            american_odds: Some(-150),
            simulated_probability: p_sim,
            implied_probability: 0.6,
            edge_pct,
            confidence_pct: 80.0,
            variance_tag: VarianceTag::Low,
            agent_signals: vec![
                AgentSignal {
                    name: "striking".into(),
                    signal: Signal::Pass,
                    description: String::new(),
                };
                4
            ],
            rationale: String::new(),
        }
    }
}

/// Outcome of qualification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Qualified,
    Filtered,
}

/// A candidate bet with its qualification verdict.
///
/// `reject_reasons` is empty iff `status` is `Qualified`; construct through
/// [`QualifiedBet::from_reasons`] to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifiedBet {
    #[serde(flatten)]
    pub bet: CandidateBet,
    pub status: BetStatus,
    #[serde(rename = "rejectReasons")]
    pub reject_reasons: Vec<String>,
}

impl QualifiedBet {
    pub fn from_reasons(bet: CandidateBet, reject_reasons: Vec<String>) -> Self {
        let status = if reject_reasons.is_empty() {
            BetStatus::Qualified
        } else {
            BetStatus::Filtered
        };
        Self {
            bet,
            status,
            reject_reasons,
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.status == BetStatus::Qualified
    }
}

impl fmt::Display for QualifiedBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            BetStatus::Qualified => write!(f, "✓ {}", self.bet),
            BetStatus::Filtered => {
                write!(f, "✗ {} [{}]", self.bet, self.reject_reasons.join("; "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Ids arrive as strings from some producers and integers from others.
pub(crate) fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// American odds may be a number, a signed string (`"+150"`, `"−150"`), or
/// a composite display string (`"-132 / +200"`, first price wins).
fn american_odds<'de, D>(d: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok())
            .filter(|v| *v != 0),
        serde_json::Value::String(s) => convert::parse_american(&s),
        _ => None,
    })
}

fn american_odds_out<S>(odds: &Option<i32>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match odds {
        Some(v) => s.serialize_str(&convert::format_american(*v)),
        None => s.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A single cascade tier produced nothing. Never escapes the resolver.
    #[error("No odds from {tier} tier: {reason}")]
    ResolutionMiss { tier: SourceTier, reason: String },

    #[error("Malformed stream frame: {0}")]
    ParseFailure(String),

    #[error("Fight {fight_id} analysis failed: {message}")]
    FightFailure { fight_id: String, message: String },

    #[error("Analysis stream aborted: {0}")]
    FatalStream(String),

    #[error("Usage limit reached: {0}")]
    QuotaExceeded(String),

    #[error("Run {0} has not completed; refusing to persist partial results")]
    RunIncomplete(String),

    #[error("Results for run {0} were already persisted")]
    AlreadyPersisted(String),
}

impl PipelineError {
    /// Whether callers should route the user to an upgrade path.
    pub fn is_quota(&self) -> bool {
        matches!(self, PipelineError::QuotaExceeded(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
