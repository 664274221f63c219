//! Moldkeeper - maintenance state service for injection molds
//!
//! Tracks the shot count of each tooling asset, derives which shot-based
//! inspection tiers and calendar checks are coming due, and carries
//! maintenance checklists through a draft, pending and approved workflow.
//!
//! ## Components
//!
//! - **Registry**: asset identity and maintenance attributes
//! - **Ledger**: append-only shot entries with a running total
//! - **Schedule**: tier status derived from the current total
//! - **Notify**: ranked, deduplicated maintenance notifications
//! - **Checklist**: structured inspection forms and their approval workflow
//! - **Repair**: repair reports with priority and status
//! - **Session**: asset-scoped write tokens for shop-floor clients

pub mod auth;
pub mod checklist;
pub mod config;
pub mod db;
pub mod ledger;
pub mod notify;
pub mod registry;
pub mod repair;
pub mod routes;
pub mod schedule;
pub mod server;
pub mod session;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{KeeperError, Result};
