//! Domain model for the tractometry pipeline.
//!
//! # Responsibility
//! - Define the canonical per-subject data unit and its raw input roles.
//! - Define process-wide pipeline configuration.
//! - Define the derived-artifact column set and its dependency graph.
//!
//! # Invariants
//! - A `DataUnit` is immutable once discovered.
//! - Every derived column has exactly one producing stage and a fixed
//!   dependency list.

pub mod artifact;
pub mod config;
pub mod unit;
