//! HTTP client for the semantic platform.
//!
//! Authenticates with the OAuth client-credentials flow on first use. Entity
//! queries (`SELECT FIELDS(Standard) FROM <Entity>`) follow `nextRecordsUrl`
//! until the result set is exhausted.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::candidate::{Asset, Platform};
use crate::config::{secret_from_env, BridgeConfig, SemanticPlatformConfig};
use crate::error::{ensure_success, BridgeError, BridgeResult};
use crate::semantic::model::{SemanticModel, SemanticModelSummary};
use crate::semantic::{
    CreatedVisualization, DashboardRecord, DashboardWidgetRecord, SemanticPlatform,
    VisualizationSummary, VizWidgetDefinitionRecord, Workspace,
};
use crate::visual::VisualSpecDraft;

#[derive(Debug, Clone)]
struct SemanticSession {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityPage<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
    #[serde(default)]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    items: Vec<SemanticModelSummary>,
}

#[derive(Debug, Deserialize)]
struct VisualizationList {
    #[serde(default)]
    visualizations: Vec<VisualizationSummary>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceList {
    #[serde(default)]
    workspaces: Vec<Workspace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceAssetList {
    #[serde(default)]
    workspace_assets: Vec<Value>,
}

pub struct SemanticRestClient {
    config: SemanticPlatformConfig,
    client_secret: String,
    client: Client,
    session: OnceCell<SemanticSession>,
}

impl SemanticRestClient {
    pub fn new(config: SemanticPlatformConfig, client_secret: String) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;

        Ok(Self {
            config,
            client_secret,
            client,
            session: OnceCell::new(),
        })
    }

    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let secret = secret_from_env(&config.semantic.client_secret_env)?;
        Self::new(config.semantic.clone(), secret)
    }

    async fn session(&self) -> BridgeResult<&SemanticSession> {
        self.session.get_or_try_init(|| self.authenticate()).await
    }

    async fn authenticate(&self) -> BridgeResult<SemanticSession> {
        let url = format!(
            "{}/services/oauth2/token",
            self.config.org_domain.trim_end_matches('/')
        );
        info!(org = %self.config.org_domain, "Authenticating to semantic platform");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;
        let response = ensure_success(Platform::Semantic, response, "authentication").await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;

        Ok(SemanticSession {
            access_token: token.access_token,
            instance_url: token.instance_url.trim_end_matches('/').to_string(),
        })
    }

    fn base_url(&self, session: &SemanticSession) -> String {
        format!(
            "{}/services/data/{}",
            session.instance_url, self.config.api_version
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> BridgeResult<T> {
        let session = self.session().await?;
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;
        let response = ensure_success(Platform::Semantic, response, context).await?;
        response
            .json()
            .await
            .map_err(|e| BridgeError::parse(format!("unexpected {} response: {}", context, e)))
    }

    async fn post_json(&self, url: &str, body: &Value, context: &str) -> BridgeResult<reqwest::Response> {
        let session = self.session().await?;
        debug!(url, "POST");
        let response = self
            .client
            .post(url)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;
        ensure_success(Platform::Semantic, response, context).await
    }

    /// All standard fields of every record of an entity type.
    async fn entity_records<T: DeserializeOwned + Send>(&self, entity: &str) -> BridgeResult<Vec<T>> {
        let session = self.session().await?;
        let mut url = format!(
            "{}/query?q=SELECT+FIELDS(Standard)+FROM+{}",
            self.base_url(session),
            entity
        );
        let mut records = Vec::new();

        loop {
            let page: EntityPage<T> = self.get_json(&url, &format!("{} query", entity)).await?;
            records.extend(page.records);
            match page.next_records_url {
                Some(next) => url = absolute_url(&session.instance_url, &next),
                None => break,
            }
        }

        info!(entity, count = records.len(), "Fetched entity records");
        Ok(records)
    }
}

fn absolute_url(instance_url: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        path_or_url.to_string()
    } else {
        format!("{}{}", instance_url, path_or_url)
    }
}

/// Request body for the image download endpoint.
pub fn image_request_body(asset: &Asset) -> BridgeResult<Value> {
    match asset {
        Asset::Dashboard { api_name, .. } => Ok(json!({
            "asset": { "dashboardName": api_name, "type": "Dashboard" }
        })),
        Asset::Metric { id } => Ok(json!({
            "asset": { "assetId": id, "type": "Submetric" }
        })),
        Asset::View { luid } => Err(BridgeError::Validation(format!(
            "view {} belongs to the workbook platform",
            luid
        ))),
    }
}

#[async_trait]
impl SemanticPlatform for SemanticRestClient {
    async fn semantic_models(&self) -> BridgeResult<Vec<SemanticModelSummary>> {
        let url = format!("{}/ssot/semantic/models", self.base_url(self.session().await?));
        let list: ModelList = self.get_json(&url, "semantic model listing").await?;
        Ok(list.items)
    }

    async fn semantic_model(&self, api_name: &str) -> BridgeResult<SemanticModel> {
        let url = format!(
            "{}/ssot/semantic/models/{}",
            self.base_url(self.session().await?),
            urlencoding::encode(api_name)
        );
        self.get_json(&url, &format!("semantic model {}", api_name)).await
    }

    async fn dashboards(&self) -> BridgeResult<Vec<DashboardRecord>> {
        self.entity_records("AnalyticsDashboard").await
    }

    async fn dashboard_widgets(&self) -> BridgeResult<Vec<DashboardWidgetRecord>> {
        self.entity_records("AnalyticsDashboardWidget").await
    }

    async fn viz_widget_definitions(&self) -> BridgeResult<Vec<VizWidgetDefinitionRecord>> {
        self.entity_records("AnalyticsVizWidgetDef").await
    }

    async fn visualizations(&self) -> BridgeResult<Vec<VisualizationSummary>> {
        let url = format!(
            "{}/tableau/visualizations?minorVersion=-1",
            self.base_url(self.session().await?)
        );
        let list: VisualizationList = self.get_json(&url, "visualization listing").await?;
        Ok(list.visualizations)
    }

    async fn visualization(&self, id_or_name: &str) -> BridgeResult<VisualSpecDraft> {
        let url = format!(
            "{}/tableau/visualizations/{}?minorVersion=-1",
            self.base_url(self.session().await?),
            urlencoding::encode(id_or_name)
        );
        self.get_json(&url, &format!("visualization {}", id_or_name)).await
    }

    async fn workspaces(&self) -> BridgeResult<Vec<Workspace>> {
        let url = format!("{}/tableau/workspaces", self.base_url(self.session().await?));
        let list: WorkspaceList = self.get_json(&url, "workspace listing").await?;
        Ok(list.workspaces)
    }

    async fn workspace_assets(&self, workspace_id: &str) -> BridgeResult<Vec<Asset>> {
        let url = format!(
            "{}/tableau/workspaces/{}/assets",
            self.base_url(self.session().await?),
            urlencoding::encode(workspace_id)
        );
        let list: WorkspaceAssetList = self
            .get_json(&url, &format!("assets of workspace {}", workspace_id))
            .await?;

        let total = list.workspace_assets.len();
        let assets: Vec<Asset> = list
            .workspace_assets
            .iter()
            .filter_map(Asset::classify)
            .collect();
        if assets.len() < total {
            debug!(
                workspace = workspace_id,
                skipped = total - assets.len(),
                "Skipped assets that are neither dashboards nor metrics"
            );
        }
        Ok(assets)
    }

    async fn download_image(&self, asset: &Asset) -> BridgeResult<Vec<u8>> {
        let body = image_request_body(asset)?;
        let url = format!(
            "{}/tableau/download?metadataOnly=false",
            self.base_url(self.session().await?)
        );
        let response = self
            .post_json(&url, &body, &format!("image of asset {}", asset.id()))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::http(Platform::Semantic, e))?;
        Ok(bytes.to_vec())
    }

    async fn create_visualization(&self, draft: &VisualSpecDraft) -> BridgeResult<CreatedVisualization> {
        let session = self.session().await?;
        let url = format!("{}/tableau/visualizations?minorVersion=-1", self.base_url(session));
        let body = serde_json::to_value(draft)
            .map_err(|e| BridgeError::parse(format!("could not serialize visualization: {}", e)))?;

        let response = self
            .post_json(&url, &body, &format!("create visualization {}", draft.name))
            .await?;
        if response.status() != reqwest::StatusCode::CREATED {
            warn!(status = %response.status(), "Visualization created with unexpected status");
        }
        let mut created: CreatedVisualization = response
            .json()
            .await
            .map_err(|e| BridgeError::parse(format!("unexpected create response: {}", e)))?;
        created.edit_url = Some(edit_url(&session.instance_url, &created.name));
        info!(name = %created.name, id = %created.id, "Visualization created");
        Ok(created)
    }
}

/// Editor link for a visualization.
pub fn edit_url(instance_url: &str, visualization_name: &str) -> String {
    format!(
        "{}/tableau/visualization/{}/edit",
        instance_url.trim_end_matches('/'),
        visualization_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_request_bodies() {
        let dashboard = Asset::Dashboard {
            id: "0FK1".into(),
            api_name: "Sales_Overview".into(),
        };
        assert_eq!(
            image_request_body(&dashboard).unwrap(),
            json!({ "asset": { "dashboardName": "Sales_Overview", "type": "Dashboard" } })
        );
        assert_eq!(
            image_request_body(&Asset::Metric { id: "m1".into() }).unwrap(),
            json!({ "asset": { "assetId": "m1", "type": "Submetric" } })
        );
        assert!(image_request_body(&Asset::View { luid: "v".into() }).is_err());
    }

    #[test]
    fn test_next_records_url_is_made_absolute() {
        assert_eq!(
            absolute_url("https://org.example.com", "/services/data/v64.0/query/01g-2000"),
            "https://org.example.com/services/data/v64.0/query/01g-2000"
        );
        assert_eq!(absolute_url("https://a", "https://b/x"), "https://b/x");
    }

    #[test]
    fn test_entity_page_shape() {
        let page: EntityPage<DashboardRecord> = serde_json::from_value(json!({
            "totalSize": 1,
            "done": true,
            "records": [{
                "attributes": { "type": "AnalyticsDashboard" },
                "Id": "0FK1",
                "MasterLabel": "Sales Overview",
                "DeveloperName": "Sales_Overview"
            }]
        }))
        .unwrap();
        assert_eq!(page.records[0].master_label, "Sales Overview");
        assert!(page.next_records_url.is_none());
    }

    #[test]
    fn test_edit_url() {
        assert_eq!(
            edit_url("https://org.example.com/", "sales_rebuilt"),
            "https://org.example.com/tableau/visualization/sales_rebuilt/edit"
        );
    }
}
