//! Shared wire types for the pvegate workspace.
//!
//! Keep cross-crate DTOs here so the gateway and the cluster adapter agree on
//! the request/response shapes without depending on each other.

#![warn(missing_docs)]

/// Shared API DTOs for cross-crate use.
pub mod api;
