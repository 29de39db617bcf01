//! Database seeding functionality
//!
//! Populates catalog tables that must exist before the first sync runs.

pub mod provider;

pub use provider::seed_providers;
