//! Mock search provider for integration testing.
//!
//! Returns canned text per bookmaker and records every query, all in
//! memory with no network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mafs::odds::search::SearchProvider;

#[derive(Clone, Default)]
pub struct MockSearch {
    /// Bookmaker name -> result text. Queries for other books return "".
    pages: HashMap<String, String>,
    queries: Arc<Mutex<Vec<String>>>,
    /// If set, every search returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, bookmaker: &str, text: &str) -> Self {
        self.pages.insert(bookmaker.to_string(), text.to_string());
        self
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{err}"));
        }
        let bookmaker = query.rsplit(' ').next().unwrap_or_default();
        Ok(self.pages.get(bookmaker).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock-search"
    }
}
