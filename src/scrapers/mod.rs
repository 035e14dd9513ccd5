//! Source adapters that fetch content and merge it into the store.
//!
//! Each adapter turns upstream pages or feeds into persisted rows and
//! exposes a `run()` that fetches, normalizes and merges in one go.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Social link aggregator | [`social`] | JSON, then HTML, then Atom | One collection per (community, window) |
//! | Blog reading list | [`blog`] | HTML scraping | Two steps: category page, then the day's post |
//! | News feeds | [`news`] | RSS 2.0 | Keyword categories, one row per match |
//!
//! # Common Patterns
//!
//! - All network access goes through [`http::HttpFetch`] so tests can serve
//!   canned pages.
//! - Fetches are sequential with randomized or fixed pauses between them
//!   ([`http::Pacer`]).
//! - A failing sub-source is logged and skipped; only a failed write to the
//!   store aborts a run.

pub mod blog;
pub mod http;
pub mod news;
pub mod social;
pub mod xml;

use std::fmt;

/// Counters from one adapter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Sub-sources (community/window pairs, feeds, posts) fetched successfully.
    pub units_ok: usize,
    pub units_failed: usize,
    /// Raw items parsed before dedup and classification.
    pub fetched: usize,
    /// Rows newly appended to the store.
    pub added: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} failed, {} fetched, {} new",
            self.units_ok, self.units_failed, self.fetched, self.added
        )
    }
}
