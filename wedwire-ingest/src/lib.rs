//! Ingestion pipeline for wedding news.
//!
//! [`Orchestrator`] turns raw search results into stored [`Article`]s: each
//! result's page is fetched with a per-fetch timeout, run through the content
//! extractor and image resolver, merged with any previously stored row and
//! upserted by link. Reads through [`Orchestrator::get_article`] backfill
//! missing content at most once per staleness window.
//!
//! [`Article`]: wedwire_common::Article

mod orchestrator;
pub mod published;

pub use orchestrator::Orchestrator;
pub use published::normalize_published;
