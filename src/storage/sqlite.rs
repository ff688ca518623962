//! SQLite-backed fighter directory and odds history.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::odds::database::{FighterDirectory, FighterRecord, HistoricalQuote, QuoteHistory};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS fighters (
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS odds_history (
        fight_id TEXT NOT NULL,
        fighter_id TEXT NOT NULL REFERENCES fighters(id),
        bookmaker TEXT,
        moneyline INTEGER,
        recorded_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_odds_history_fighter ON odds_history(fighter_id, recorded_at DESC)",
];

#[derive(Clone)]
pub struct SqliteOddsStore {
    pool: SqlitePool,
}

impl SqliteOddsStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .context(format!("Failed to open odds database at {url}"))?;
        let store = Self::from_pool(pool).await?;
        info!(url, "Odds database ready");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("Failed to create odds schema")?;
        }
        Ok(Self { pool })
    }

    pub async fn upsert_fighter(&self, fighter: &FighterRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fighters (id, first_name, last_name) VALUES (?1, ?2, ?3)
            ON CONFLICT (id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name
            "#,
        )
        .bind(&fighter.id)
        .bind(&fighter.first_name)
        .bind(&fighter.last_name)
        .execute(&self.pool)
        .await
        .context(format!("Failed to upsert fighter {}", fighter.id))?;
        Ok(())
    }

    /// History is append-only.
    pub async fn record_quote(&self, quote: &HistoricalQuote) -> Result<()> {
        sqlx::query(
            "INSERT INTO odds_history (fight_id, fighter_id, bookmaker, moneyline, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&quote.fight_id)
        .bind(&quote.fighter_id)
        .bind(&quote.bookmaker)
        .bind(quote.moneyline)
        .bind(quote.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .context(format!("Failed to record quote for fight {}", quote.fight_id))?;
        Ok(())
    }
}

#[async_trait]
impl FighterDirectory for SqliteOddsStore {
    async fn get(&self, id: &str) -> Result<Option<FighterRecord>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, first_name, last_name FROM fighters WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to query fighter")?;
        Ok(row.map(|(id, first_name, last_name)| FighterRecord {
            id,
            first_name,
            last_name,
        }))
    }

    // Stored names are not normalized, so the whole directory is returned
    // and matched in Rust.
    async fn candidates(&self, normalized_name: &str) -> Result<Vec<FighterRecord>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, first_name, last_name FROM fighters ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list fighters")?;
        debug!(query = normalized_name, rows = rows.len(), "Loaded fighter candidates");
        Ok(rows
            .into_iter()
            .map(|(id, first_name, last_name)| FighterRecord {
                id,
                first_name,
                last_name,
            })
            .collect())
    }
}

#[async_trait]
impl QuoteHistory for SqliteOddsStore {
    async fn quotes_for(&self, fighter_ids: &[&str]) -> Result<Vec<HistoricalQuote>> {
        let mut out = Vec::new();
        for fighter_id in fighter_ids {
            let rows: Vec<(String, String, Option<String>, Option<i64>, String)> = sqlx::query_as(
                "SELECT fight_id, fighter_id, bookmaker, moneyline, recorded_at \
                 FROM odds_history WHERE fighter_id = ?1 ORDER BY recorded_at DESC",
            )
            .bind(fighter_id)
            .fetch_all(&self.pool)
            .await
            .context(format!("Failed to load odds history for {fighter_id}"))?;

            for (fight_id, fighter_id, bookmaker, moneyline, recorded_at) in rows {
                let timestamp = DateTime::parse_from_rfc3339(&recorded_at)
                    .context(format!("Bad timestamp {recorded_at} in odds history"))?
                    .with_timezone(&Utc);
                out.push(HistoricalQuote {
                    fight_id,
                    fighter_id,
                    bookmaker,
                    moneyline: moneyline.and_then(|m| i32::try_from(m).ok()),
                    timestamp,
                });
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
