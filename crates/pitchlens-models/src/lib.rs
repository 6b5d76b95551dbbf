//! Shared data models for the PitchLens backend.
//!
//! This crate provides Serde-serializable types for:
//! - The tactical analysis request and its source selector
//! - The structured tactical report returned to callers
//! - Shape validation of untyped report payloads

pub mod report;
pub mod request;

// Re-export common types
pub use report::{
    KeyTacticalMoment, PlayerHighlight, ReportValidationError, TacticalReport,
};
pub use request::{AnalysisSource, AnalyzeTacticsRequest, SourceSelectionError};
