//! # Lifecycle Module
//!
//! Core lifetime tracking and construction caching.
//!
//! This module contains:
//! - Identifiers and defaults (`types`)
//! - Error types (`error`)
//! - The reference / dependency graph (`reference`)
//! - The native resource capability and its owning wrapper (`resource`)
//! - The lifecycle manager registry (`manager`)
//! - The process-wide default manager (`global`)
//! - The keyed construction cache (`cache`)
//! - The builder collaborator pattern (`builder`)
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod reference;
pub mod resource;
pub mod manager;
pub mod global;
pub mod cache;
pub mod builder;
