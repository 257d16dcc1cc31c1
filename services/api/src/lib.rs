//! services/api/src/lib.rs
//!
//! Library crate for the API service. The `api` binary wires these modules
//! into a running server; the `openapi` binary only uses the route
//! definitions to emit the specification.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
