//! Integration tests for tabpin

mod catalog;
mod config_integration;
mod message_protocol;
mod reconcile;
mod resilient_store;
