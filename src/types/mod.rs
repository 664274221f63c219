//! Shared types for Moldkeeper

pub mod error;

pub use error::{KeeperError, Result};
