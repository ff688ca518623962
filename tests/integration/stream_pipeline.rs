use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::post, Router};
use std::convert::Infallible;
use std::time::Duration;

use mafs::storage::{load_run_results, save_run_results};
use mafs::stream::{consume, AnalysisClient, FatalKind, StatusPhase};
use mafs::strategy::{recommend_results, RiskLevel, Thresholds};
use mafs::types::PipelineError;

fn bet_json(id: u32, label: &str, p_sim: f64, edge: f64, variance: &str, passes: usize) -> String {
    let signals: Vec<String> = (0..4)
        .map(|i| {
            let signal = if i < passes { "pass" } else { "fail" };
            format!(r#"{{"name":"agent{i}","signal":"{signal}","desc":""}}"#)
        })
        .collect();
    format!(
        r#"{{"id":"b{id}","label":"{label}","bet_type":"Moneyline","odds_american":"+140",
            "P_sim":{p_sim},"P_imp":0.42,"edge_pct":{edge},"confidencePct":70,
            "varianceTag":"{variance}","agentSignals":[{}],"reason":"model edge"}}"#,
        signals.join(",")
    )
}

fn fight_frame(fight_id: u32, odds_source: &str, bet: String) -> String {
    let json = format!(
        r#"{{"type":"fight","fightId":{fight_id},"oddsSource":"{odds_source}","edge":{bet},"breakdown":{{"notes":"n"}}}}"#
    )
    .replace('\n', " ");
    format!("data: {json}\n\n")
}

/// A card of four fights: two clean qualifiers, one placeholder-priced
/// qualifier, one low-probability bet, and a failed fight.
fn card_frames() -> Vec<String> {
    vec![
        "data: {\"type\":\"status\",\"phase\":\"fetching_odds\",\"message\":\"Fetching live odds\",\"progress\":{\"current\":1,\"total\":5}}\n\n".to_string(),
        ": keep-alive\n\n".to_string(),
        "data: {\"type\":\"status\",\"phase\":\"analyzing_card\",\"message\":\"Analyzing card holistically\"}\n\n".to_string(),
        fight_frame(1, "api", bet_json(1, "Jones ML", 0.72, 6.5, "low", 4)),
        fight_frame(2, "manual_search", bet_json(2, "Over 2.5", 0.61, 3.0, "medium", 3)),
        fight_frame(3, "fallback", bet_json(3, "Gane ML", 0.66, 9.0, "low", 4)),
        "data: {\"type\":\"fight_error\",\"fightId\":4,\"message\":\"model timeout\"}\n\n".to_string(),
        fight_frame(5, "api", bet_json(5, "Pereira by KO", 0.35, 1.0, "high", 1)),
        "data: {\"type\":\"complete\"}\n\n".to_string(),
    ]
}

/// Re-chunk a byte sequence at a fixed width so frames straddle reads.
fn rechunk(frames: &[String], width: usize) -> Vec<Result<Vec<u8>, Infallible>> {
    let bytes: Vec<u8> = frames.concat().into_bytes();
    bytes.chunks(width).map(|c| Ok(c.to_vec())).collect()
}

#[tokio::test]
async fn captured_run_aggregates_qualifies_and_persists() {
    let state = consume(futures::stream::iter(rechunk(&card_frames(), 7))).await;

    assert!(state.is_complete);
    assert_eq!(state.skipped_frames, 0);
    assert_eq!(state.total_fights, Some(5));
    assert_eq!(state.phase, Some(StatusPhase::AnalyzingCard));
    let ids: Vec<_> = state.results.iter().map(|r| r.fight_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "5"]);
    assert!(matches!(
        &state.errors[..],
        [PipelineError::FightFailure { fight_id, .. }] if fight_id == "4"
    ));

    let gated = Thresholds {
        reject_placeholder_odds: true,
        ..Thresholds::default()
    };
    let rec = recommend_results(&state.results, &gated);
    assert_eq!(rec.qualified_count, 2);
    let top: Vec<_> = rec.ranking.top.iter().map(|q| q.bet.id.as_str()).collect();
    assert_eq!(top, vec!["b1", "b2", "b3"]);
    assert_eq!(
        rec.ranking.top[2].reject_reasons,
        vec!["Odds are a placeholder, not market data"]
    );
    assert_eq!(rec.ranking.filtered.len(), 1);
    assert_eq!(rec.ranking.risk_level, RiskLevel::Low);

    // default thresholds do not gate on synthetic odds
    let open = recommend_results(&state.results, &Thresholds::default());
    assert_eq!(open.qualified_count, 3);

    let dir = std::env::temp_dir().join(format!("mafs_it_{}", uuid::Uuid::new_v4()));
    save_run_results(&state, &dir).unwrap();
    assert!(save_run_results(&state, &dir).is_err());
    let loaded = load_run_results(&dir, &state.run_id).unwrap().unwrap();
    assert_eq!(loaded.len(), 4);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn quota_error_frame_freezes_run() {
    let frames = vec![
        fight_frame(1, "api", bet_json(1, "Jones ML", 0.72, 6.5, "low", 4)),
        "data: {\"type\":\"error\",\"message\":\"Free analysis limit reached\"}\n\n".to_string(),
        fight_frame(2, "api", bet_json(2, "Late", 0.9, 9.9, "low", 4)),
    ];
    let state = consume(futures::stream::iter(rechunk(&frames, 64))).await;

    assert!(state.is_fatal);
    assert_eq!(state.fatal.as_ref().map(|(k, _)| *k), Some(FatalKind::Quota));
    assert_eq!(state.results.len(), 1);
    assert!(state.outcome().unwrap_err().is_quota());
}

// ---------------------------------------------------------------------------
// Live client against a local job server
// ---------------------------------------------------------------------------

async fn spawn_job_server() -> String {
    let app = Router::new()
        .route(
            "/api/agents",
            post(|| async { Body::from_stream(futures::stream::iter(rechunk(&card_frames(), 33))) }),
        )
        .route(
            "/api/limited",
            post(|| async { (StatusCode::FORBIDDEN, "Monthly limit reached").into_response() }),
        )
        .route(
            "/api/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn client_streams_a_full_run() {
    let base = spawn_job_server().await;
    let client = AnalysisClient::new(format!("{base}/api/agents"), Duration::from_secs(5)).unwrap();

    let state = client
        .run(&serde_json::json!({"data": {"Name": "UFC Test"}}), std::future::pending::<()>())
        .await
        .unwrap();
    assert!(state.is_complete);
    assert_eq!(state.results.len(), 4);
    assert_eq!(state.errors.len(), 1);
}

#[tokio::test]
async fn client_maps_rejections() {
    let base = spawn_job_server().await;

    let limited = AnalysisClient::new(format!("{base}/api/limited"), Duration::from_secs(5)).unwrap();
    let err = limited.run(&serde_json::json!({}), std::future::pending::<()>()).await.unwrap_err();
    assert_eq!(err, PipelineError::QuotaExceeded("Monthly limit reached".into()));

    let broken = AnalysisClient::new(format!("{base}/api/broken"), Duration::from_secs(5)).unwrap();
    let err = broken.run(&serde_json::json!({}), std::future::pending::<()>()).await.unwrap_err();
    assert!(matches!(err, PipelineError::FatalStream(_)));
}
