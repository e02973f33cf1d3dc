//! Normalized, cross-platform description of a chart that may answer a question.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two visualization platforms the pipeline bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// XML-authored workbooks with a GraphQL metadata layer.
    Workbook,
    /// JSON-authored visualizations backed by semantic models.
    Semantic,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Workbook => f.write_str("the workbook platform"),
            Platform::Semantic => f.write_str("the semantic platform"),
        }
    }
}

/// Where a candidate's rendered image comes from, decided once when the
/// record is ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// A published view on the workbook platform.
    View { luid: String },
    Dashboard { id: String, api_name: String },
    Metric { id: String },
}

impl Asset {
    /// Classify a raw workspace asset record.
    ///
    /// Dashboards carry `attributes.type == "AnalyticsDashboard"`; metrics are
    /// recognised by a non-empty `insightsSettings` object.
    pub fn classify(record: &serde_json::Value) -> Option<Asset> {
        let id = record
            .get("id")
            .or_else(|| record.get("Id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let attribute_type = record
            .get("attributes")
            .and_then(|a| a.get("type"))
            .and_then(|t| t.as_str());

        if attribute_type == Some("AnalyticsDashboard") {
            let api_name = record
                .get("DeveloperName")
                .or_else(|| record.get("name"))
                .and_then(|v| v.as_str())?
                .to_string();
            return Some(Asset::Dashboard {
                id: id.unwrap_or_default(),
                api_name,
            });
        }

        let has_insights = record
            .get("insightsSettings")
            .and_then(|s| s.as_object())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if has_insights {
            return id.map(|id| Asset::Metric { id });
        }

        None
    }

    pub fn id(&self) -> &str {
        match self {
            Asset::View { luid } => luid,
            Asset::Dashboard { id, .. } | Asset::Metric { id } => id,
        }
    }
}

/// One selectable chart (dashboard) with the labels and fields it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationCandidate {
    pub id: String,
    pub label: String,
    pub source_platform: Platform,
    pub child_visualization_labels: Vec<String>,
    pub field_names: Vec<String>,
    /// How to fetch the rendered image on the owning platform.
    pub asset: Asset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_dashboard_record() {
        let record = json!({
            "Id": "0FK000000001",
            "DeveloperName": "Sales_Overview",
            "attributes": { "type": "AnalyticsDashboard" }
        });
        assert_eq!(
            Asset::classify(&record),
            Some(Asset::Dashboard {
                id: "0FK000000001".into(),
                api_name: "Sales_Overview".into()
            })
        );
    }

    #[test]
    fn test_classify_metric_record() {
        let record = json!({
            "id": "metric-7",
            "insightsSettings": { "enabled": true }
        });
        assert_eq!(
            Asset::classify(&record),
            Some(Asset::Metric { id: "metric-7".into() })
        );
    }

    #[test]
    fn test_classify_unknown_record() {
        let record = json!({ "id": "x", "insightsSettings": {} });
        assert_eq!(Asset::classify(&record), None);
    }
}
