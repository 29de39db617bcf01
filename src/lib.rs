//! # Cloudspend Library
//!
//! Multi-provider cloud resource sync and cost attribution: provider
//! adapters, normalization, pricing, snapshot tracking, account and bulk
//! sync runs, and the HTTP service around them.

pub mod auth;
pub mod bulk_sync;
pub mod complete_sync;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalization;
pub mod pricing;
pub mod providers;
pub mod repositories;
pub mod scheduler;
pub mod seeds;
pub mod server;
pub mod sync_orchestrator;
pub mod telemetry;
pub mod tracker;
pub use migration;
