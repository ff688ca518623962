//! MAFS: fight-card betting recommendation pipeline.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches one of the subcommands:
//!
//! ```text
//! mafs resolve "A vs B" ["C vs D" ...]   resolve odds through the cascade
//! mafs run <payload.json>                start an analysis job and rank its bets
//! mafs replay <capture.txt>              re-aggregate a captured stream
//! mafs serve                             start the HTTP API
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use mafs::api::{self, ApiState};
use mafs::config::AppConfig;
use mafs::storage;
use mafs::stream::{self, AnalysisClient, AnalysisRunState};
use mafs::strategy::{recommend_results, Recommendation};
use mafs::types::Matchup;

const BANNER: &str = r#"
 __  __    _    _____ ____
|  \/  |  / \  |  ___/ ___|
| |\/| | / _ \ | |_  \___ \
| |  | |/ ___ \|  _|  ___) |
|_|  |_/_/   \_\_|   |____/

  Fight-card odds, simulation and bet qualification
"#;

const USAGE: &str = "usage: mafs <resolve|run|replay|serve> [args...]";

/// Replay chunk size; small enough to exercise frame reassembly.
const REPLAY_CHUNK: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::var("MAFS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{USAGE}");
    };

    println!("{BANNER}");

    match command.as_str() {
        "resolve" => resolve(&cfg, &args[1..]).await,
        "run" => run(&cfg, args.get(1)).await,
        "replay" => replay(&cfg, args.get(1)).await,
        "serve" => serve(&cfg).await,
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

async fn resolve(cfg: &AppConfig, displays: &[String]) -> Result<()> {
    let matchups = displays
        .iter()
        .map(|d| Matchup::parse(d).with_context(|| format!("expected \"A vs B\", got {d:?}")))
        .collect::<Result<Vec<_>>>()?;
    if matchups.is_empty() {
        bail!("resolve needs at least one \"A vs B\" matchup");
    }

    let resolver = cfg.build_resolver().await?;
    for (matchup, quote) in resolver.resolve_batch(&matchups).await {
        println!("{matchup}: {quote}");
    }
    Ok(())
}

async fn run(cfg: &AppConfig, payload_path: Option<&String>) -> Result<()> {
    let path = payload_path.context("run needs a JSON payload file")?;
    let payload: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(path).context(format!("Failed to read payload {path}"))?,
    )
    .context(format!("Failed to parse payload {path}"))?;

    let client = AnalysisClient::new(
        cfg.stream.endpoint.clone(),
        Duration::from_secs(cfg.stream.connect_timeout_secs),
    )?;
    info!(endpoint = client.endpoint(), "Starting analysis job");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        warn!("Shutdown signal received, stopping stream");
    };

    let state = match client.run(&payload, shutdown).await {
        Ok(state) => state,
        Err(e) if e.is_quota() => {
            error!(error = %e, "Usage limit reached; upgrade to continue");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    finish(cfg, state)
}

async fn replay(cfg: &AppConfig, capture_path: Option<&String>) -> Result<()> {
    let path = capture_path.context("replay needs a captured stream file")?;
    let bytes = tokio::fs::read(path)
        .await
        .context(format!("Failed to read capture {path}"))?;

    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        bytes.chunks(REPLAY_CHUNK).map(|c| Ok(c.to_vec())).collect();
    let state = stream::consume(futures::stream::iter(chunks)).await;
    finish(cfg, state)
}

/// Report, rank and persist a finished run.
fn finish(cfg: &AppConfig, state: AnalysisRunState) -> Result<()> {
    info!(
        run_id = %state.run_id,
        results = state.results.len(),
        fight_errors = state.errors.len(),
        skipped_frames = state.skipped_frames,
        complete = state.is_complete,
        "Run finished"
    );
    for e in &state.errors {
        warn!(error = %e, "Fight not analyzed");
    }

    let recommendation = recommend_results(&state.results, &cfg.qualification);
    print_recommendation(&recommendation);

    match state.outcome() {
        Ok(_) => {
            let path = storage::save_run_results(&state, Path::new(&cfg.stream.results_dir))?;
            println!("\nResults saved to {}", path.display());
            Ok(())
        }
        Err(e) if state.cancelled => {
            warn!(error = %e, "Run cancelled; partial results not persisted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_recommendation(rec: &Recommendation) {
    let r = &rec.ranking;
    println!(
        "Top picks ({} qualified, {} filtered) | avg edge {:.1}% | avg confidence {:.0}% | risk {}",
        rec.qualified_count, rec.filtered_count, r.avg_edge, r.avg_confidence, r.risk_level
    );
    for bet in &r.top {
        println!("  {bet}");
    }
    if !r.filtered.is_empty() {
        println!("Filtered:");
        for bet in &r.filtered {
            println!("  {bet}");
        }
    }
}

async fn serve(cfg: &AppConfig) -> Result<()> {
    let resolver = cfg.build_resolver().await?;
    let state = Arc::new(ApiState::new(resolver, cfg.qualification.clone()));

    tokio::select! {
        result = api::serve(state, cfg.server.port) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping API server");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mafs=info"));

    let json_logging = std::env::var("MAFS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
