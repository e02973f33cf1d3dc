//! Language-model seams: ranking a catalog against a question and commenting
//! on a rendered chart image.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::{Platform, VisualizationCandidate};
use crate::error::BridgeResult;

pub use openai::OpenAiOracle;

pub const RANKING_SYSTEM_PROMPT: &str = "You are a data analyst tasked with identifying the best possible visualization to answer a data question. You will be provided a list of visualizations with their titles, and data fields being used.

Based on that title and the fields available, you need to determine which visualization is the most appropriate for answering the question.

As an answer, return solely the id of the visualization, in JSON format such as:
```json
{
    \"id\": \"visualization_id\"
}
```";

pub fn commentary_prompt(question: &str) -> String {
    format!(
        "Answer the following data question with the attached dashboard:\n\n{}",
        question
    )
}

/// The view of a candidate the ranking oracle gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub source: Platform,
    pub visualizations: &'a [String],
    pub fields: &'a [String],
}

impl<'a> From<&'a VisualizationCandidate> for RankingEntry<'a> {
    fn from(candidate: &'a VisualizationCandidate) -> Self {
        Self {
            id: &candidate.id,
            label: &candidate.label,
            source: candidate.source_platform,
            visualizations: &candidate.child_visualization_labels,
            fields: &candidate.field_names,
        }
    }
}

/// Render the user turn of a ranking request.
pub fn ranking_user_prompt(question: &str, candidates: &[VisualizationCandidate]) -> BridgeResult<String> {
    let entries: Vec<RankingEntry<'_>> = candidates.iter().map(RankingEntry::from).collect();
    let listing = serde_json::to_string_pretty(&entries)
        .map_err(|e| crate::error::BridgeError::parse(format!("serializing candidates: {}", e)))?;
    Ok(format!(
        "Question: {}\n\nVisualizations:\n```json\n{}\n```",
        question, listing
    ))
}

/// Raw oracle answer. The id is left untyped: oracles answer with strings,
/// numbers, `null` or nothing at all, and the selection engine decides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RankingResponse {
    #[serde(default)]
    pub id: Option<Value>,
}

#[async_trait]
pub trait RankingOracle: Send + Sync {
    async fn rank(
        &self,
        question: &str,
        candidates: &[VisualizationCandidate],
    ) -> BridgeResult<RankingResponse>;
}

#[async_trait]
pub trait CommentaryOracle: Send + Sync {
    /// Describe a PNG image in answer to `prompt`.
    async fn comment(&self, image: &[u8], prompt: &str) -> BridgeResult<String>;
}

/// Strip a surrounding ``` fence (with or without a language tag).
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return trimmed,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Asset;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"id\": \"1\"}\n```"), "{\"id\": \"1\"}");
        assert_eq!(strip_code_fence("  {\"id\": \"1\"} "), "{\"id\": \"1\"}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_ranking_prompt_lists_candidates() {
        let candidates = vec![VisualizationCandidate {
            id: "d-1".into(),
            label: "Regional Sales".into(),
            source_platform: Platform::Workbook,
            child_visualization_labels: vec!["Sales by Region".into()],
            field_names: vec!["Region".into(), "Sales".into()],
            asset: Asset::View { luid: "d-1".into() },
        }];
        let prompt = ranking_user_prompt("Which region sells most?", &candidates).unwrap();
        assert!(prompt.starts_with("Question: Which region sells most?"));
        assert!(prompt.contains("\"id\": \"d-1\""));
        assert!(prompt.contains("\"source\": \"workbook\""));
        assert!(prompt.contains("Sales by Region"));
    }

    #[test]
    fn test_missing_id_deserializes_to_none() {
        let response: RankingResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.id, None);
    }
}
