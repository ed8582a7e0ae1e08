//! tradesim — deterministic trade simulation and risk-sizing engine.
//!
//! Hexagonal architecture: pure logic in [`domain`], port traits in [`ports`],
//! file-backed implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
