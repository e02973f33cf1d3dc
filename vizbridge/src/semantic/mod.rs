//! The semantic platform: semantic models, JSON visualizations, dashboards
//! and workspaces.

pub mod model;
pub mod rest;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::candidate::Asset;
use crate::error::{BridgeError, BridgeResult};
use crate::visual::VisualSpecDraft;
pub use model::{resolve, SemanticDataObject, SemanticField, SemanticModel, SemanticModelSummary};
pub use rest::SemanticRestClient;

/// `AnalyticsDashboard` entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "MasterLabel", default)]
    pub master_label: String,
    #[serde(rename = "DeveloperName", default)]
    pub developer_name: String,
}

impl DashboardRecord {
    pub fn asset(&self) -> Asset {
        Asset::Dashboard {
            id: self.id.clone(),
            api_name: self.developer_name.clone(),
        }
    }
}

/// `AnalyticsDashboardWidget` entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardWidgetRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "AnalyticsDashboardId")]
    pub dashboard_id: Option<String>,
    #[serde(rename = "Type")]
    pub widget_type: Option<String>,
}

impl DashboardWidgetRecord {
    pub fn is_visualization(&self) -> bool {
        self.widget_type.as_deref() == Some("visualization")
    }
}

/// `AnalyticsVizWidgetDef` entity record linking a widget to a visualization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizWidgetDefinitionRecord {
    #[serde(rename = "AnalyticsDashboardWidgetId")]
    pub widget_id: Option<String>,
    #[serde(rename = "AnalyticsVisualizationId")]
    pub visualization_id: Option<String>,
}

/// Field entry of a visualization as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationField {
    pub field_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationSummary {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, VisualizationField>,
}

impl VisualizationSummary {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.values().filter_map(|f| f.field_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
}

/// Reference to a freshly submitted visualization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedVisualization {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
    /// Link to the visualization editor, when the instance URL is known
    #[serde(default)]
    pub edit_url: Option<String>,
}

/// Everything the pipeline reads from and writes to the semantic platform.
#[async_trait]
pub trait SemanticPlatform: Send + Sync {
    async fn semantic_models(&self) -> BridgeResult<Vec<SemanticModelSummary>>;

    async fn semantic_model(&self, api_name: &str) -> BridgeResult<SemanticModel>;

    async fn dashboards(&self) -> BridgeResult<Vec<DashboardRecord>>;

    async fn dashboard_widgets(&self) -> BridgeResult<Vec<DashboardWidgetRecord>>;

    async fn viz_widget_definitions(&self) -> BridgeResult<Vec<VizWidgetDefinitionRecord>>;

    async fn visualizations(&self) -> BridgeResult<Vec<VisualizationSummary>>;

    /// Re-fetch one visualization document by id or API name.
    async fn visualization(&self, id_or_name: &str) -> BridgeResult<VisualSpecDraft>;

    async fn workspaces(&self) -> BridgeResult<Vec<Workspace>>;

    /// Downloadable assets in a workspace; records that are neither
    /// dashboards nor metrics are left out.
    async fn workspace_assets(&self, workspace_id: &str) -> BridgeResult<Vec<Asset>>;

    async fn download_image(&self, asset: &Asset) -> BridgeResult<Vec<u8>>;

    async fn create_visualization(&self, draft: &VisualSpecDraft) -> BridgeResult<CreatedVisualization>;
}

/// Find a workspace by name, ignoring case.
pub async fn find_workspace(platform: &dyn SemanticPlatform, name: &str) -> BridgeResult<Workspace> {
    platform
        .workspaces()
        .await?
        .into_iter()
        .find(|w| w.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| BridgeError::NotFound(format!("workspace '{}'", name)))
}

/// Downloadable dashboards and metrics of the named workspace.
pub async fn assets_in_workspace(platform: &dyn SemanticPlatform, name: &str) -> BridgeResult<Vec<Asset>> {
    let workspace = find_workspace(platform, name).await?;
    platform.workspace_assets(&workspace.id).await
}
