//! Gatekeeper - Admission Control for HTTP Services
//!
//! This crate decides, per incoming request, whether a caller has exceeded
//! its configured rate. Callers are identified by API token or client
//! address, counted in fixed windows held in a shared store (Redis, or
//! process memory for single-node use), and hard-blocked for a configured
//! period once they reach their limit.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
