//! # Tenancy Service Library
//!
//! Core functionality for the tenancy service: the tenant directory and
//! per-tenant connection pool, credential encryption, token-based identity,
//! and the HTTP surface that ties them together.

pub mod auth;
pub mod authz;
pub mod config;
pub mod crypto;
pub mod db;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pool;
pub mod provisioner;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token;
pub use migration;
