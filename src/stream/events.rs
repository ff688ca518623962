//! Wire events emitted by the analysis job.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{null_as_default, string_or_number, CandidateBet};

/// Pipeline stage reported by `status` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    FetchingOdds,
    AnalyzingCard,
    AnalyzingFight,
    #[serde(other)]
    Other,
}

impl fmt::Display for StatusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPhase::FetchingOdds => write!(f, "fetching_odds"),
            StatusPhase::AnalyzingCard => write!(f, "analyzing_card"),
            StatusPhase::AnalyzingFight => write!(f, "analyzing_fight"),
            StatusPhase::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

/// One analyzed fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightResult {
    #[serde(rename = "fightId", deserialize_with = "string_or_number")]
    pub fight_id: String,
    pub edge: CandidateBet,
    #[serde(default)]
    pub breakdown: serde_json::Value,
    #[serde(rename = "oddsSource", default, skip_serializing_if = "Option::is_none")]
    pub odds_source: Option<String>,
}

impl FightResult {
    /// Whether the odds behind this result were synthesized rather than
    /// taken from a market (`fallback` / `placeholder`).
    pub fn uses_placeholder_odds(&self) -> bool {
        self.odds_source
            .as_deref()
            .map(|s| {
                let s = s.trim().to_ascii_lowercase();
                s == "fallback" || s == "placeholder"
            })
            .unwrap_or(false)
    }
}

/// A decoded `data:` frame, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        phase: StatusPhase,
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<Progress>,
    },
    Fight(FightResult),
    FightError {
        #[serde(
            rename = "fightId",
            default,
            deserialize_with = "optional_id",
            skip_serializing_if = "Option::is_none"
        )]
        fight_id: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
    },
    Complete,
    Error {
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
        #[serde(
            default,
            deserialize_with = "optional_id",
            skip_serializing_if = "Option::is_none"
        )]
        code: Option<String>,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status { .. } => "status",
            StreamEvent::Fight(_) => "fight",
            StreamEvent::FightError { .. } => "fight_error",
            StreamEvent::Complete => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Encode as a wire frame (`data: <json>\n\n`).
    pub fn to_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

fn optional_id<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Id(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Id>::deserialize(d)?.map(|Id(s)| s))
}
