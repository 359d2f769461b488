//! Tabpin: Declarative Pinned-Tab Reconciliation
//!
//! Keeps a declared set of tabs open and pinned in a browser session. Configured tabs
//! live in a resilient key-value store; each run compares them with the live tabs by
//! normalized URL, pins what is open, creates what is missing and touches nothing else.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod message;
pub mod normalize;
pub mod reconcile;
pub mod store;
pub mod ttl;
pub mod types;
