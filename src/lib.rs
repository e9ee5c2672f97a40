//! # Doru
//!
//! The query subsystem of a full-text search engine: a structurally shared
//! query algebra, a term-expansion layer for wildcard and edit-distance
//! queries, an equivalence-preserving optimiser, and a posting-list matcher
//! with match-count estimation.
//!
//! ## Features
//!
//! - Immutable, cheaply clonable query trees with operator overloads
//! - Wildcard and edit-distance expansion with per-shard limit policies
//! - Boolean, positional (PHRASE/NEAR), synonym and scale-weight matching
//! - Lower/estimated/upper match-count bounds without full enumeration
//! - Pluggable weighting schemes (boolean, BM25, TF-IDF)

pub mod error;
pub mod index;
pub mod query;
pub mod search;
pub mod weight;

pub use error::{DoruError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
