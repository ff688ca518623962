//! Last-resort synthetic odds.
//!
//! Used only when every market-backed tier has missed. The output is a
//! pure function of the two names so repeated runs agree with each other.

use crate::types::{Matchup, OddsQuote, SourceTier, Totals};

pub const FAVORITE_ODDS: i32 = -200;
pub const UNDERDOG_ODDS: i32 = 170;
pub const DEFAULT_TOTALS: Totals = Totals {
    line: 2.5,
    over: -110,
    under: -110,
};

/// Infallible final tier of the cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTier;

impl PlaceholderTier {
    pub fn quote(&self, matchup: &Matchup) -> OddsQuote {
        let score = (matchup.fighter_a.chars().count() + matchup.fighter_b.chars().count()) % 10;
        let (moneyline_a, moneyline_b) = if score < 5 {
            (FAVORITE_ODDS, UNDERDOG_ODDS)
        } else {
            (UNDERDOG_ODDS, FAVORITE_ODDS)
        };

        OddsQuote {
            moneyline_a,
            moneyline_b,
            totals: Some(DEFAULT_TOTALS),
            source_tier: SourceTier::Placeholder,
            provenance: "placeholder".to_string(),
        }
    }
}
