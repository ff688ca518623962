//! Database tier: stored fighter identities and historical bookmaker lines.
//!
//! Source names arrive in inconsistent order ("Jones Jon", "Jon Jones",
//! "jon 'bones' jones"), so identities are matched by bidirectional substring
//! containment against both `"first last"` and `"last first"` after
//! normalization.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{OddsSource, Pacer};
use crate::types::{Matchup, OddsQuote, SourceTier};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored fighter identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FighterRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl FighterRecord {
    pub fn new(id: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }

    fn full_name(&self) -> String {
        normalize_name(&format!("{} {}", self.first_name, self.last_name))
    }

    fn reversed_name(&self) -> String {
        normalize_name(&format!("{} {}", self.last_name, self.first_name))
    }
}

/// One bookmaker price for one fighter in one fight at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalQuote {
    pub fight_id: String,
    pub fighter_id: String,
    pub bookmaker: Option<String>,
    /// `None` when the book listed the fight without a price.
    pub moneyline: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Fighter identity directory.
#[async_trait]
pub trait FighterDirectory: Send + Sync {
    /// Look up a fighter by id.
    async fn get(&self, id: &str) -> Result<Option<FighterRecord>>;

    /// Candidate records for a normalized name. Implementations may return
    /// a superset; the tier applies the matching rule itself.
    async fn candidates(&self, normalized_name: &str) -> Result<Vec<FighterRecord>>;
}

/// Append-only odds history.
#[async_trait]
pub trait QuoteHistory: Send + Sync {
    /// Every stored quote for any of the given fighter ids.
    async fn quotes_for(&self, fighter_ids: &[&str]) -> Result<Vec<HistoricalQuote>>;
}

// ---------------------------------------------------------------------------
// Name matching
// ---------------------------------------------------------------------------

/// Lowercase, drop everything except ASCII letters/digits/spaces, and
/// collapse runs of whitespace.
pub fn normalize_name(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NameMatch {
    Partial,
    Exact,
}

fn match_record(record: &FighterRecord, query: &str) -> Option<NameMatch> {
    if query.is_empty() {
        return None;
    }
    let forms = [record.full_name(), record.reversed_name()];
    if forms.iter().any(|f| f == query) {
        return Some(NameMatch::Exact);
    }
    forms
        .iter()
        .filter(|f| !f.is_empty())
        .any(|f| f.contains(query) || query.contains(f.as_str()))
        .then_some(NameMatch::Partial)
}

/// Resolve a free-text name to a stored identity. A stored id given
/// verbatim wins outright; otherwise exact name matches beat partial ones,
/// and among equals the directory's order wins.
pub async fn resolve_identity(
    directory: &dyn FighterDirectory,
    name: &str,
) -> Result<Option<FighterRecord>> {
    let query = normalize_name(name);
    if query.is_empty() {
        return Ok(None);
    }

    if let Some(record) = directory.get(name.trim()).await? {
        return Ok(Some(record));
    }

    let mut best: Option<(NameMatch, FighterRecord)> = None;
    for record in directory.candidates(&query).await? {
        if let Some(kind) = match_record(&record, &query) {
            if best.as_ref().map(|(k, _)| kind > *k).unwrap_or(true) {
                best = Some((kind, record));
            }
        }
    }
    Ok(best.map(|(_, r)| r))
}

/// Most recent fight in which both fighters have a priced quote.
///
/// Within a fight the latest priced quote per fighter is used; fights are
/// ranked by the newer of those two timestamps.
pub fn latest_pair<'a>(
    quotes: &'a [HistoricalQuote],
    fighter_a: &str,
    fighter_b: &str,
) -> Option<(&'a HistoricalQuote, &'a HistoricalQuote)> {
    type Latest<'q> = (Option<&'q HistoricalQuote>, Option<&'q HistoricalQuote>);
    let mut by_fight: BTreeMap<&str, Latest<'a>> = BTreeMap::new();

    fn newer<'q>(slot: &mut Option<&'q HistoricalQuote>, q: &'q HistoricalQuote) {
        if slot.map(|cur| q.timestamp > cur.timestamp).unwrap_or(true) {
            *slot = Some(q);
        }
    }

    for q in quotes.iter().filter(|q| q.moneyline.is_some()) {
        let entry = by_fight.entry(q.fight_id.as_str()).or_default();
        if q.fighter_id == fighter_a {
            newer(&mut entry.0, q);
        } else if q.fighter_id == fighter_b {
            newer(&mut entry.1, q);
        }
    }

    by_fight
        .into_values()
        .filter_map(|(a, b)| Some((a?, b?)))
        .max_by_key(|(a, b)| a.timestamp.max(b.timestamp))
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// First cascade tier: stored identities plus quote history.
pub struct DatabaseTier {
    directory: Arc<dyn FighterDirectory>,
    history: Arc<dyn QuoteHistory>,
}

impl DatabaseTier {
    pub fn new(directory: Arc<dyn FighterDirectory>, history: Arc<dyn QuoteHistory>) -> Self {
        Self { directory, history }
    }
}

#[async_trait]
impl OddsSource for DatabaseTier {
    fn tier(&self) -> SourceTier {
        SourceTier::Database
    }

    fn name(&self) -> &str {
        "database"
    }

    async fn lookup(&self, matchup: &Matchup, _pacer: &Pacer) -> Result<Option<OddsQuote>> {
        let a = resolve_identity(self.directory.as_ref(), &matchup.fighter_a).await?;
        let b = resolve_identity(self.directory.as_ref(), &matchup.fighter_b).await?;

        let (Some(a), Some(b)) = (a, b) else {
            debug!(%matchup, "Fighter identity not found in directory");
            return Ok(None);
        };
        if a.id == b.id {
            debug!(%matchup, fighter_id = %a.id, "Both names resolved to one identity");
            return Ok(None);
        }

        let quotes = self.history.quotes_for(&[&a.id, &b.id]).await?;
        let Some((qa, qb)) = latest_pair(&quotes, &a.id, &b.id) else {
            debug!(%matchup, quotes = quotes.len(), "No priced fight containing both fighters");
            return Ok(None);
        };

        // Both filtered on `moneyline.is_some()` in `latest_pair`.
        let (Some(moneyline_a), Some(moneyline_b)) = (qa.moneyline, qb.moneyline) else {
            return Ok(None);
        };

        let provenance = match &qa.bookmaker {
            Some(book) => format!("database:{book}"),
            None => "database".to_string(),
        };

        debug!(
            %matchup,
            fight_id = %qa.fight_id,
            moneyline_a,
            moneyline_b,
            "Resolved odds from history"
        );

        Ok(Some(OddsQuote {
            moneyline_a,
            moneyline_b,
            totals: None,
            source_tier: SourceTier::Database,
            provenance,
        }))
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Directory and history held in memory. Loaded from fixtures or a JSON
/// snapshot; read-only once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryOddsStore {
    pub fighters: Vec<FighterRecord>,
    pub quotes: Vec<HistoricalQuote>,
}

impl InMemoryOddsStore {
    pub fn new(fighters: Vec<FighterRecord>, quotes: Vec<HistoricalQuote>) -> Self {
        Self { fighters, quotes }
    }
}

#[async_trait]
impl FighterDirectory for InMemoryOddsStore {
    async fn get(&self, id: &str) -> Result<Option<FighterRecord>> {
        Ok(self.fighters.iter().find(|f| f.id == id).cloned())
    }

    async fn candidates(&self, _normalized_name: &str) -> Result<Vec<FighterRecord>> {
        Ok(self.fighters.clone())
    }
}

#[async_trait]
impl QuoteHistory for InMemoryOddsStore {
    async fn quotes_for(&self, fighter_ids: &[&str]) -> Result<Vec<HistoricalQuote>> {
        Ok(self
            .quotes
            .iter()
            .filter(|q| fighter_ids.contains(&q.fighter_id.as_str()))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
