//! Test case management server library.
//!
//! Execution lifecycle and pooled test-set runs over a pluggable entity
//! store, with the HTTP handlers, persistence layer and artifact storage
//! used by the `tcms` binary.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
pub mod store;
