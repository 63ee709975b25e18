//! Feed ingestion and reconciliation for a personal content aggregator.
//!
//! Given site URLs, `gleaner` discovers each site's RSS/Atom feed, parses
//! the entries, normalizes them into uniform posts and stores them in
//! SQLite without duplicates. Registered sources can be refreshed later,
//! either rebuilding their posts or merging new entries in.
//!
//! - [`feed`] - discovery, HTTP boundary, parsing, normalization
//! - [`storage`] - sources and posts on SQLite
//! - [`ingest`] - the batch and refresh workflows
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
