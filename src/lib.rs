//! Purpose: Library crate behind the `tradinghours` CLI and integration tests.
//! Exports: `api` (store hierarchy, catalog, descriptors, models, data sources, errors).
//! Role: Local disk cache of market and currency calendars with keyed and range lookups.
//! Invariants: `api` is the only public path; internal modules may change freely.
//! Invariants: Single-writer: concurrent ingestion into one store is a caller responsibility.
pub mod api;
mod catalog;
mod config;
mod core;
mod declared;
mod models;
mod remote;
