//! Odds resolution.
//!
//! An [`OddsResolver`] walks an ordered chain of [`OddsSource`] tiers
//! (stored history, then external search) and falls back to the
//! [`PlaceholderTier`], so every call yields a quote.

pub mod convert;
pub mod database;
pub mod extract;
pub mod placeholder;
pub mod search;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::types::{Matchup, OddsQuote, PipelineError, SourceTier};
pub use placeholder::PlaceholderTier;

/// Default spacing between external lookups inside a batch.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(2000);

/// One tier of the resolution cascade.
///
/// `Ok(None)` is a miss; an `Err` is logged by the resolver and also
/// treated as a miss.
#[async_trait]
pub trait OddsSource: Send + Sync {
    fn tier(&self) -> SourceTier;

    fn name(&self) -> &str;

    /// Look up a quote. Tiers that hit rate-limited services call
    /// [`Pacer::wait`] before their first outbound request.
    async fn lookup(&self, matchup: &Matchup, pacer: &Pacer) -> Result<Option<OddsQuote>>;
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Minimum spacing between rate-limited requests. The first request is
/// never delayed.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Option<Duration>,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn unpaced() -> Self {
        Self {
            min_interval: None,
            last: Mutex::new(None),
        }
    }

    pub fn every(interval: Duration) -> Self {
        Self {
            min_interval: (!interval.is_zero()).then_some(interval),
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(delay_ms = (ready_at - now).as_millis() as u64, "Pacing external lookup");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Result of a traced resolution: the quote plus every tier miss on the way.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub quote: OddsQuote,
    pub misses: Vec<PipelineError>,
}

/// Tiered odds cascade. Shared state is read-only, so one resolver can
/// serve concurrent calls for different matchups.
pub struct OddsResolver {
    sources: Vec<Box<dyn OddsSource>>,
    placeholder: PlaceholderTier,
    batch_delay: Duration,
}

impl OddsResolver {
    pub fn new(sources: Vec<Box<dyn OddsSource>>) -> Self {
        Self {
            sources,
            placeholder: PlaceholderTier,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Names of the configured tiers in cascade order, placeholder last.
    pub fn tier_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| s.name().to_string())
            .chain(std::iter::once(SourceTier::Placeholder.to_string()))
            .collect()
    }

    pub async fn resolve(&self, fighter_a: &str, fighter_b: &str) -> OddsQuote {
        self.resolve_matchup(&Matchup::new(fighter_a, fighter_b)).await
    }

    pub async fn resolve_matchup(&self, matchup: &Matchup) -> OddsQuote {
        self.resolve_traced(matchup, &Pacer::unpaced()).await.quote
    }

    /// Walk the cascade, recording why each tier missed.
    pub async fn resolve_traced(&self, matchup: &Matchup, pacer: &Pacer) -> Resolution {
        let mut misses = Vec::new();

        for source in &self.sources {
            match source.lookup(matchup, pacer).await {
                Ok(Some(quote)) => {
                    info!(%matchup, tier = %quote.source_tier, odds = %quote, "Odds resolved");
                    return Resolution { quote, misses };
                }
                Ok(None) => {
                    debug!(%matchup, source = source.name(), "Tier miss");
                    misses.push(PipelineError::ResolutionMiss {
                        tier: source.tier(),
                        reason: format!("{} returned no quote", source.name()),
                    });
                }
                Err(e) => {
                    warn!(%matchup, source = source.name(), error = %e, "Tier failed, falling through");
                    misses.push(PipelineError::ResolutionMiss {
                        tier: source.tier(),
                        reason: format!("{}: {e:#}", source.name()),
                    });
                }
            }
        }

        let quote = self.placeholder.quote(matchup);
        warn!(%matchup, odds = %quote, "No market odds found, using placeholder");
        Resolution { quote, misses }
    }

    /// Resolve matchups one after another in input order. External lookups
    /// are spaced by the batch delay.
    pub async fn resolve_batch(&self, matchups: &[Matchup]) -> Vec<(Matchup, OddsQuote)> {
        self.resolve_batch_traced(matchups)
            .await
            .into_iter()
            .map(|(m, r)| (m, r.quote))
            .collect()
    }

    /// [`resolve_batch`](Self::resolve_batch), keeping each entry's misses.
    pub async fn resolve_batch_traced(&self, matchups: &[Matchup]) -> Vec<(Matchup, Resolution)> {
        let pacer = Pacer::every(self.batch_delay);
        let mut out = Vec::with_capacity(matchups.len());

        for (i, matchup) in matchups.iter().enumerate() {
            debug!(index = i + 1, total = matchups.len(), %matchup, "Resolving batch entry");
            let resolution = self.resolve_traced(matchup, &pacer).await;
            out.push((matchup.clone(), resolution));
        }

        let synthetic = out.iter().filter(|(_, r)| r.quote.is_synthetic()).count();
        info!(total = out.len(), synthetic, "Batch resolution complete");
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
