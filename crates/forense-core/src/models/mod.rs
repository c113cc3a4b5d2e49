//! Data models for analysis results.
//!
//! - `AnalysisResult`: the structured verdict returned by the API
//! - `AutomatedAnalysis`, `GeminiAnalysis`: the two halves of a verdict
//! - `MethodDetail`: per-method (FFT, noise, ELA) breakdown
//!
//! `AnalysisResult::demo()` provides the canned result used while offline.

pub mod analysis;
pub mod demo;

pub use analysis::{
    AnalysisDetails, AnalysisResult, AutomatedAnalysis, Confidence, GeminiAnalysis,
    IndividualScores, MethodDetail, MethodStatus, Verdict,
};
