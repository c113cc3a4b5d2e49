//! Forense AI core - session lifecycle and image analysis client.
//!
//! This crate talks to the Forense AI forensics API. It keeps an anonymous
//! bearer session alive transparently, submits images for analysis, and
//! degrades to an offline demonstration mode when the API is unreachable.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
mod testing;

pub use api::{AnalysisClient, ApiError};
pub use auth::{SessionManager, UsageSnapshot};
pub use config::Config;
pub use models::AnalysisResult;
