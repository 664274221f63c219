//! HTTP server for Moldkeeper

pub mod http;

pub use http::{run, AppState};
