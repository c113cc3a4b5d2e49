//! REST API access for the Forense AI analysis service.
//!
//! This module provides the `AnalysisClient` for submitting images and the
//! `Transport` seam every request goes through. Requests are authenticated
//! with an anonymous bearer session managed by `crate::auth`.

pub mod client;
pub mod error;
pub mod transport;

pub use client::AnalysisClient;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, RequestBody, ReqwestTransport, Transport};
