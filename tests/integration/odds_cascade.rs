use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mafs::odds::database::{DatabaseTier, FighterRecord, HistoricalQuote};
use mafs::odds::search::ExternalSearchTier;
use mafs::odds::{OddsResolver, OddsSource};
use mafs::storage::sqlite::SqliteOddsStore;
use mafs::types::{Matchup, SourceTier};

use crate::mock_search::MockSearch;

async fn seeded_store() -> Arc<SqliteOddsStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteOddsStore::from_pool(pool).await.unwrap();

    for f in [
        FighterRecord::new("jj", "Jon", "Jones"),
        FighterRecord::new("sm", "Stipe", "Miocic"),
        FighterRecord::new("ta", "Tom", "Aspinall"),
    ] {
        store.upsert_fighter(&f).await.unwrap();
    }
    for (fighter, ml) in [("jj", -250), ("sm", 200)] {
        store
            .record_quote(&HistoricalQuote {
                fight_id: "ufc-309-main".into(),
                fighter_id: fighter.into(),
                bookmaker: Some("DraftKings".into()),
                moneyline: Some(ml),
                timestamp: Utc.with_ymd_and_hms(2024, 11, 15, 20, 0, 0).unwrap(),
            })
            .await
            .unwrap();
    }
    Arc::new(store)
}

fn resolver(store: Arc<SqliteOddsStore>, search: &MockSearch, delay: Duration) -> OddsResolver {
    let sources: Vec<Box<dyn OddsSource>> = vec![
        Box::new(DatabaseTier::new(store.clone(), store)),
        Box::new(ExternalSearchTier::new(Arc::new(search.clone()))),
    ];
    OddsResolver::new(sources).with_batch_delay(delay)
}

#[tokio::test]
async fn database_hit_skips_search() {
    let search = MockSearch::new();
    let r = resolver(seeded_store().await, &search, Duration::ZERO);

    let q = r.resolve("jones jon", "Stipe Miocic").await;
    assert_eq!(q.source_tier, SourceTier::Database);
    assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 200));
    assert!(search.queries().is_empty());
}

#[tokio::test]
async fn database_miss_falls_to_search() {
    let search = MockSearch::new()
        .with_page("fanduel", "Tom Aspinall \u{2212}310\nCiryl Gane +245\nOver 2.5 -105 / Under 2.5 -115");
    let r = resolver(seeded_store().await, &search, Duration::ZERO);

    let q = r.resolve("Tom Aspinall", "Ciryl Gane").await;
    assert_eq!(q.source_tier, SourceTier::External);
    assert_eq!(q.provenance, "fanduel");
    assert_eq!((q.moneyline_a, q.moneyline_b), (-310, 245));
    let totals = q.totals.unwrap();
    assert_eq!((totals.line, totals.over, totals.under), (2.5, -105, -115));
    assert_eq!(
        search.queries(),
        vec![
            "Tom Aspinall vs Ciryl Gane odds draftkings",
            "Tom Aspinall vs Ciryl Gane odds fanduel",
        ]
    );
}

#[tokio::test]
async fn every_tier_failing_still_yields_placeholder() {
    let search = MockSearch::new();
    search.set_error("HTTP 503");
    let r = resolver(seeded_store().await, &search, Duration::ZERO);

    let first = r.resolve("Alex Pereira", "Magomed Ankalaev").await;
    let second = r.resolve("Alex Pereira", "Magomed Ankalaev").await;
    assert!(first.is_synthetic());
    assert_eq!(first, second);
    assert_eq!(search.queries().len(), 10);
}

#[tokio::test]
async fn batch_paces_only_external_lookups() {
    let search = MockSearch::new();
    let r = resolver(seeded_store().await, &search, Duration::from_millis(50));

    let matchups = vec![
        Matchup::new("Jon Jones", "Stipe Miocic"),
        Matchup::new("Unknown One", "Unknown Two"),
        Matchup::new("Jon Jones", "Stipe Miocic"),
        Matchup::new("Unknown Three", "Unknown Four"),
    ];

    let start = Instant::now();
    let out = r.resolve_batch(&matchups).await;
    let elapsed = start.elapsed();

    let tiers: Vec<_> = out.iter().map(|(_, q)| q.source_tier).collect();
    assert_eq!(
        tiers,
        vec![
            SourceTier::Database,
            SourceTier::Placeholder,
            SourceTier::Database,
            SourceTier::Placeholder
        ]
    );
    // two external lookups -> exactly one paced gap
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(1000));
}
