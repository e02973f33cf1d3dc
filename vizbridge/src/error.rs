//! Error taxonomy shared by every stage of the pipeline.

use std::fmt;
use thiserror::Error;

use crate::candidate::Platform;

/// Errors raised while answering a question or rebuilding a chart.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{platform} is unreachable: {message}")]
    Connectivity { platform: Platform, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Query returned no rows: {0}")]
    PartialData(String),

    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn connectivity(platform: Platform, message: impl fmt::Display) -> Self {
        BridgeError::Connectivity {
            platform,
            message: message.to_string(),
        }
    }

    /// Map a transport error from `reqwest` onto the platform that failed.
    pub fn http(platform: Platform, err: reqwest::Error) -> Self {
        BridgeError::connectivity(platform, err)
    }

    pub fn parse(message: impl fmt::Display) -> Self {
        BridgeError::Parse(message.to_string())
    }

    /// Whether this failure should disable a platform's catalog contribution
    /// instead of aborting the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BridgeError::Connectivity { .. })
    }

    /// Short text suitable for an end user. Never includes internal detail
    /// beyond the message itself.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Connectivity { platform, .. } => {
                format!("There was a problem connecting to {}.", platform)
            }
            BridgeError::NotFound(what) => format!("Did not find what we were looking for: {}.", what),
            BridgeError::Parse(what) => format!("Could not read the source document: {}.", what),
            BridgeError::Validation(what) => format!("No usable answer was selected: {}.", what),
            BridgeError::PartialData(what) => format!("The query returned no data: {}.", what),
            BridgeError::Oracle(_) => {
                "The language model could not be reached. Please try again.".to_string()
            }
            BridgeError::Config(what) => format!("The service is misconfigured: {}.", what),
            BridgeError::Io(_) => "A local file could not be read.".to_string(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Pass a successful response through; turn anything else into an error
/// naming what was being requested. 404 is `NotFound`, the rest is a
/// connectivity failure of that platform.
pub(crate) async fn ensure_success(
    platform: Platform,
    response: reqwest::Response,
    context: &str,
) -> BridgeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(BridgeError::NotFound(context.to_string()));
    }
    Err(BridgeError::connectivity(
        platform,
        format!("{} failed with {}: {}", context, status, body),
    ))
}

/// Stages of the rebuild state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RebuildStage {
    LocateLineage,
    MatchSemanticModel,
    FetchSemanticMetadata,
    FetchAndUnpackDocument,
    ParseWorksheet,
    RunSpecBuilder,
    ResolveWorkspace,
    Submit,
}

impl RebuildStage {
    pub fn name(&self) -> &'static str {
        match self {
            RebuildStage::LocateLineage => "locate_lineage",
            RebuildStage::MatchSemanticModel => "match_semantic_model",
            RebuildStage::FetchSemanticMetadata => "fetch_semantic_metadata",
            RebuildStage::FetchAndUnpackDocument => "fetch_and_unpack_document",
            RebuildStage::ParseWorksheet => "parse_worksheet",
            RebuildStage::RunSpecBuilder => "run_spec_builder",
            RebuildStage::ResolveWorkspace => "resolve_workspace",
            RebuildStage::Submit => "submit",
        }
    }
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rebuild failure, tagged with the stage that abandoned the pipeline.
#[derive(Debug, Error)]
#[error("Rebuild failed at stage {stage}: {source}")]
pub struct RebuildError {
    pub stage: RebuildStage,
    #[source]
    pub source: BridgeError,
}

impl RebuildError {
    pub fn new(stage: RebuildStage, source: BridgeError) -> Self {
        Self { stage, source }
    }

    pub fn user_message(&self) -> String {
        self.source.user_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_is_classified() {
        let err = BridgeError::connectivity(Platform::Semantic, "timeout");
        assert!(err.is_connectivity());
        assert!(!BridgeError::NotFound("model".into()).is_connectivity());
    }

    #[test]
    fn test_rebuild_error_names_stage() {
        let err = RebuildError::new(
            RebuildStage::MatchSemanticModel,
            BridgeError::NotFound("semantic model labelled 'Superstore'".into()),
        );
        let text = err.to_string();
        assert!(text.contains("match_semantic_model"));
        assert!(text.contains("Superstore"));
    }

    #[test]
    fn test_stages_are_ordered() {
        use RebuildStage::*;
        let run_order = vec![
            LocateLineage,
            MatchSemanticModel,
            FetchSemanticMetadata,
            FetchAndUnpackDocument,
            ParseWorksheet,
            RunSpecBuilder,
            ResolveWorkspace,
            Submit,
        ];
        let mut sorted = run_order.clone();
        sorted.sort();
        assert_eq!(sorted, run_order);
    }
}
