//! Integration tests: odds cascade over real collaborators and the
//! analysis stream end to end.

mod mock_search;
mod odds_cascade;
mod stream_pipeline;
