//! Analysis stream handling: wire events, frame decoding, run aggregation
//! and the job client.

pub mod aggregator;
pub mod client;
pub mod events;
pub mod framing;

pub use aggregator::{consume, consume_until, AnalysisRunState, FatalKind};
pub use client::AnalysisClient;
pub use events::{FightResult, Progress, StatusPhase, StreamEvent};
pub use framing::FrameDecoder;
