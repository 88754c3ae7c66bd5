//! Cycle enumeration and profit evaluation.
//!
//! `finder` turns the admissible pair universe into concrete multi-hop
//! cycles; `profit` evaluates a cycle's per-unit return against live
//! top-of-book quotes.

pub mod finder;
pub mod profit;

pub use finder::CycleFinder;
pub use profit::{Cycle, ProfitError, Step};
