//! Error taxonomy for polpredict.
//!
//! Library functions return `anyhow::Result`; the variants below are carried inside
//! `anyhow::Error` and can be recovered with `downcast_ref::<PredictError>()`.
//!
//! `SampleMismatch` and `ExternalTool` only ever fail the sequence being processed;
//! every other variant aborts the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    /// Reference or sample alignment that cannot be used
    #[error("Malformed alignment '{source_name}': {message}")]
    MalformedAlignment {
        source_name: String,
        message: String,
    },

    /// Feature definition entries that are neither all columns nor all column pairs
    #[error("Invalid feature definition '{feature}': {message}")]
    FeatureDefinition { feature: String, message: String },

    /// Sample alignment whose rows do not extend the reference alignment
    #[error("Sample alignment does not extend the reference: {0}")]
    SampleMismatch(String),

    /// External tool exited with an error or produced no usable output
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Nothing passed the profile search
    #[error("No viable hits found at E-value <= {threshold}")]
    NoSurvivors { threshold: f64 },

    /// Selected model field that no feature definition can produce
    #[error("Selected field '{0}' is not produced by the feature layout")]
    UnknownField(String),

    /// Model schema that does not agree with the feature definitions
    #[error("Model schema error: {0}")]
    Schema(String),

    /// Every sequence was rejected before scoring
    #[error("No sequence has all selected fields ({rejected} rejected)")]
    EmptyTable { rejected: usize },

    /// Scorer output that does not match the table it was given
    #[error("Scorer output error: {0}")]
    ScorerOutput(String),
}

impl PredictError {
    pub fn malformed_alignment(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        PredictError::MalformedAlignment {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn feature_definition(feature: impl Into<String>, message: impl Into<String>) -> Self {
        PredictError::FeatureDefinition {
            feature: feature.into(),
            message: message.into(),
        }
    }

    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        PredictError::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
