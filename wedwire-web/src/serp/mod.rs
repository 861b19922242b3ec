//! News discovery through SerpAPI's Google News mode.

mod client;
mod types;

pub use client::{NewsSearch, SerpApi};
pub use types::{NewsQuery, SerpNewsResponse, SerpNewsResult, SourceField, map_freshness};
