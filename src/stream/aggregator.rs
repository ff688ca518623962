//! Folds analysis stream events into a single run state.
//!
//! The state has one writer. Once a `complete` or `error` frame lands (or
//! the transport fails) it is frozen and later events are dropped.

use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

use super::events::{FightResult, Progress, StatusPhase, StreamEvent};
use super::framing::FrameDecoder;
use crate::types::PipelineError;

const QUOTA_CODE: &str = "quota_exceeded";
const QUOTA_PHRASE: &str = "limit reached";

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// The job reported an `error` frame.
    Stream,
    /// The job reported a usage limit.
    Quota,
    /// The byte channel itself failed.
    Transport,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalKind::Stream => write!(f, "stream"),
            FatalKind::Quota => write!(f, "quota"),
            FatalKind::Transport => write!(f, "transport"),
        }
    }
}

/// Classify an `error` frame.
pub fn classify_error(message: &str, code: Option<&str>) -> FatalKind {
    let quota_code = code
        .map(|c| c.eq_ignore_ascii_case(QUOTA_CODE))
        .unwrap_or(false);
    if quota_code || message.to_lowercase().contains(QUOTA_PHRASE) {
        FatalKind::Quota
    } else {
        FatalKind::Stream
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRunState {
    pub run_id: String,
    /// Append-only, arrival order.
    pub results: Vec<FightResult>,
    /// `FightFailure`s; never fatal.
    pub errors: Vec<PipelineError>,
    pub phase: Option<StatusPhase>,
    pub status_message: String,
    pub progress: Option<Progress>,
    pub total_fights: Option<u32>,
    pub is_complete: bool,
    pub is_fatal: bool,
    pub fatal: Option<(FatalKind, String)>,
    /// Frames that failed to decode.
    pub skipped_frames: usize,
    pub cancelled: bool,
}

impl AnalysisRunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            results: Vec::new(),
            errors: Vec::new(),
            phase: None,
            status_message: String::new(),
            progress: None,
            total_fights: None,
            is_complete: false,
            is_fatal: false,
            fatal: None,
            skipped_frames: 0,
            cancelled: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.is_fatal
    }

    /// Apply one event. Returns `false` when the state is already frozen.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        if self.is_terminal() {
            debug!(run_id = %self.run_id, kind = event.kind(), "Ignoring event after terminal frame");
            return false;
        }

        match event {
            StreamEvent::Status {
                phase,
                message,
                progress,
            } => {
                debug!(run_id = %self.run_id, %phase, %message, "Status");
                self.phase = Some(phase);
                self.status_message = message;
                if let Some(p) = progress {
                    if let Some(total) = p.total {
                        self.total_fights = Some(total);
                    }
                    self.progress = Some(p);
                }
            }
            StreamEvent::Fight(result) => {
                info!(
                    run_id = %self.run_id,
                    fight_id = %result.fight_id,
                    bet = %result.edge.label,
                    edge_pct = result.edge.edge_pct,
                    "Fight analyzed"
                );
                self.results.push(result);
            }
            StreamEvent::FightError { fight_id, message } => {
                let fight_id = fight_id.unwrap_or_else(|| "unknown".to_string());
                warn!(run_id = %self.run_id, %fight_id, %message, "Fight analysis failed");
                self.errors.push(PipelineError::FightFailure { fight_id, message });
            }
            StreamEvent::Complete => {
                info!(
                    run_id = %self.run_id,
                    results = self.results.len(),
                    errors = self.errors.len(),
                    "Analysis complete"
                );
                self.is_complete = true;
            }
            StreamEvent::Error { message, code } => {
                let kind = classify_error(&message, code.as_deref());
                self.fail(kind, message);
            }
        }
        true
    }

    /// Apply a decoded frame; decode failures are logged and counted.
    pub fn apply_frame(&mut self, frame: Result<StreamEvent, PipelineError>) {
        match frame {
            Ok(event) => {
                self.apply(event);
            }
            Err(e) if self.is_terminal() => {
                debug!(run_id = %self.run_id, error = %e, "Ignoring malformed frame after terminal frame");
            }
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Skipping malformed frame");
                self.skipped_frames += 1;
            }
        }
    }

    /// Freeze the run as failed.
    pub fn fail(&mut self, kind: FatalKind, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        let message = message.into();
        warn!(run_id = %self.run_id, %kind, %message, "Analysis run aborted");
        self.is_fatal = true;
        self.fatal = Some((kind, message));
    }

    /// The fatal failure, if any, as a domain error.
    pub fn error(&self) -> Option<PipelineError> {
        self.fatal.as_ref().map(|(kind, message)| match kind {
            FatalKind::Quota => PipelineError::QuotaExceeded(message.clone()),
            FatalKind::Stream | FatalKind::Transport => PipelineError::FatalStream(message.clone()),
        })
    }

    /// Results of a completed run.
    pub fn outcome(&self) -> Result<&[FightResult], PipelineError> {
        if let Some(e) = self.error() {
            return Err(e);
        }
        if !self.is_complete {
            return Err(PipelineError::RunIncomplete(self.run_id.clone()));
        }
        Ok(&self.results)
    }
}

/// Drive a byte stream to a terminal state or end of channel.
pub async fn consume<S, B, E>(stream: S) -> AnalysisRunState
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    consume_until(stream, std::future::pending::<()>()).await
}

/// Like [`consume`], but stops as soon as `shutdown` resolves and hands
/// back whatever state was accumulated.
pub async fn consume_until<S, B, E, F>(stream: S, shutdown: F) -> AnalysisRunState
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: Future<Output = ()>,
{
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut state = AnalysisRunState::new(run_id);
    let mut decoder = FrameDecoder::new();

    tokio::pin!(stream);
    tokio::pin!(shutdown);

    while !state.is_terminal() {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(run_id = %state.run_id, results = state.results.len(), "Analysis consumption cancelled");
                state.cancelled = true;
                break;
            }
            next = stream.next() => match next {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        state.apply_frame(frame);
                    }
                }
                Some(Err(e)) => {
                    state.fail(FatalKind::Transport, e.to_string());
                }
                None => {
                    if let Some(frame) = decoder.finish() {
                        state.apply_frame(frame);
                    }
                    if !state.is_terminal() {
                        warn!(run_id = %state.run_id, "Stream closed before a terminal frame");
                    }
                    break;
                }
            }
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateBet;

    fn fight(id: &str, edge: f64) -> StreamEvent {
        StreamEvent::Fight(FightResult {
            fight_id: id.into(),
            edge: CandidateBet::sample(id, 0.7, edge),
            breakdown: serde_json::Value::Null,
            odds_source: Some("api".into()),
        })
    }

    fn chunks(parts: Vec<&str>) -> impl Stream<Item = Result<Vec<u8>, String>> {
        futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_status_tracks_progress_and_total() {
        let mut s = AnalysisRunState::new("r");
        s.apply(StreamEvent::Status {
            phase: StatusPhase::FetchingOdds,
            message: "Fetching".into(),
            progress: Some(Progress { current: 1, total: Some(5) }),
        });
        s.apply(StreamEvent::Status {
            phase: StatusPhase::AnalyzingFight,
            message: "Analyzing".into(),
            progress: Some(Progress { current: 2, total: None }),
        });
        assert_eq!(s.total_fights, Some(5));
        assert_eq!(s.progress.unwrap().current, 2);
        assert_eq!(s.phase, Some(StatusPhase::AnalyzingFight));
        assert_eq!(s.status_message, "Analyzing");
    }

    #[test]
    fn test_terminal_freezes_state() {
        let mut s = AnalysisRunState::new("r");
        s.apply(fight("1", 3.0));
        assert!(s.apply(StreamEvent::Complete));
        assert!(!s.apply(fight("2", 4.0)));
        assert!(!s.apply(StreamEvent::Error {
            message: "late".into(),
            code: None
        }));
        assert_eq!(s.results.len(), 1);
        assert!(s.is_complete && !s.is_fatal);
        assert_eq!(s.outcome().unwrap().len(), 1);
    }

    #[test]
    fn test_fight_error_is_not_fatal() {
        let mut s = AnalysisRunState::new("r");
        s.apply(StreamEvent::FightError {
            fight_id: Some("9".into()),
            message: "model timeout".into(),
        });
        s.apply(fight("10", 2.0));
        assert!(!s.is_terminal());
        assert_eq!(s.results.len(), 1);
        assert_eq!(
            s.errors[0],
            PipelineError::FightFailure {
                fight_id: "9".into(),
                message: "model timeout".into()
            }
        );
        assert_eq!(s.outcome(), Err(PipelineError::RunIncomplete("r".into())));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("anything", Some("quota_exceeded")), FatalKind::Quota);
        assert_eq!(classify_error("Free analysis LIMIT REACHED", None), FatalKind::Quota);
        assert_eq!(classify_error("model crashed", Some("internal")), FatalKind::Stream);

        let mut s = AnalysisRunState::new("r");
        s.apply(StreamEvent::Error {
            message: "Monthly limit reached".into(),
            code: None,
        });
        assert!(s.error().unwrap().is_quota());
    }

    #[tokio::test]
    async fn test_consume_full_run_with_split_frames() {
        let frame = fight("1", 5.0).to_frame().unwrap();
        let (head, tail) = frame.split_at(frame.len() / 2);
        let stream = chunks(vec![
            ": hello\n\n",
            "data: {\"type\":\"status\",\"phase\":\"analyzing_card\",\"message\":\"Card\"}\n\n",
            head,
            tail,
            "data: {broken\n\n",
            "data: {\"type\":\"complete\"}\n\ndata: {\"type\":\"fight\"}\n\n",
        ]);

        let s = consume(stream).await;
        assert!(s.is_complete);
        assert_eq!(s.results.len(), 1);
        assert_eq!(s.skipped_frames, 1);
        assert_eq!(s.phase, Some(StatusPhase::AnalyzingCard));
        assert!(!s.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let stream = futures::stream::iter(vec![
            Ok(fight("1", 5.0).to_frame().unwrap().into_bytes()),
            Err("connection reset".to_string()),
            Ok(b"data: {\"type\":\"complete\"}\n\n".to_vec()),
        ]);
        let s = consume(stream).await;
        assert!(s.is_fatal);
        assert_eq!(s.fatal, Some((FatalKind::Transport, "connection reset".into())));
        assert_eq!(s.results.len(), 1);
    }

    #[tokio::test]
    async fn test_numeric_error_code_still_freezes_run() {
        let s = consume(chunks(vec![
            "data: {\"type\":\"error\",\"message\":\"Rate limit reached\",\"code\":429}\n\n",
            "data: {\"type\":\"complete\"}\n\n",
        ]))
        .await;
        assert!(s.is_fatal);
        assert_eq!(s.skipped_frames, 0);
        assert_eq!(s.fatal, Some((FatalKind::Quota, "Rate limit reached".into())));
        assert_eq!(
            s.outcome(),
            Err(PipelineError::QuotaExceeded("Rate limit reached".into()))
        );
    }

    #[tokio::test]
    async fn test_trailing_fragment_applied_on_close() {
        let s = consume(chunks(vec!["data: {\"type\":\"complete\"}"])).await;
        assert!(s.is_complete);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_state() {
        let first = futures::stream::iter(vec![Ok::<_, String>(fight("1", 5.0).to_frame().unwrap().into_bytes())]);
        let stream = first.chain(futures::stream::pending());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            consume_until(stream, async {
                let _ = rx.await;
            })
            .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        let s = handle.await.unwrap();
        assert!(s.cancelled);
        assert!(!s.is_terminal());
        assert_eq!(s.results.len(), 1);
    }
}
