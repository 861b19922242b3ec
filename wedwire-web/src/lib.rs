//! Web discovery and acquisition for the ingestion pipeline.
//!
//! - SerpAPI news client (`serp`) for discovery
//! - Page fetching behind the [`fetch::PageFetcher`] trait
//! - Readability-style article extraction (`extract`)
//! - Best-image selection with validation and resolution upgrades (`image`)
//!
//! Extraction and image resolution are synchronous and work on an already
//! fetched [`extract::PageDocument`], so both can be unit-tested without
//! network access.

pub mod extract;
pub mod fetch;
pub mod image;
pub mod serp;
