// src/probe/mod.rs

//! Capability probing: "is this helper command installed?"
//!
//! - [`resolver`] defines the `PathResolver` seam and the production
//!   `WhichResolver` (PATH search through the `which` crate).
//! - [`cache`] holds the `CapabilityCache`, a TTL + LRU bounded memo of probe
//!   results shared by every spawn.

pub mod cache;
pub mod resolver;

pub use cache::{CacheSettings, CapabilityCache, ProbeEntry};
pub use resolver::{PathResolver, WhichResolver};
