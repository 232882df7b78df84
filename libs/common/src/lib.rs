//! Common library for the counseling backend
//!
//! This crate provides shared functionality used by the services in the
//! workspace: database connectivity, a TTL cache service with pluggable
//! backends, an injectable clock and the infrastructure error types.

pub mod cache;
pub mod clock;
pub mod database;
pub mod error;
