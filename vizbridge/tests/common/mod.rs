//! In-memory platforms and oracles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use vizbridge::candidate::{Asset, Platform, VisualizationCandidate};
use vizbridge::data_query::{DataQuery, DataQueryService, QueryResult};
use vizbridge::error::{BridgeError, BridgeResult};
use vizbridge::oracle::{CommentaryOracle, RankingOracle, RankingResponse};
use vizbridge::semantic::model::{SemanticModel, SemanticModelSummary};
use vizbridge::semantic::{
    CreatedVisualization, DashboardRecord, DashboardWidgetRecord, SemanticPlatform,
    VisualizationSummary, VizWidgetDefinitionRecord, Workspace,
};
use vizbridge::visual::VisualSpecDraft;
use vizbridge::workbook::{DashboardLineage, DashboardNode, DownloadedDocument, WorkbookPlatform};

pub const WORKBOOK_MARKUP: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <worksheets>
    <worksheet name='Sales by Region'>
      <table>
        <view>
          <filter class='categorical' column='[ds].[none:Region:nk]'>
            <groupfilter function='member' level='[none:Region:nk]' member='&quot;West&quot;' user:ui-enumeration='inclusive' />
          </filter>
          <filter class='quantitative' column='[ds].[sum:Sales:qk]' />
        </view>
        <style>
          <style-rule element='mark'>
            <format attr='mark-labels-show' value='true' />
          </style-rule>
        </style>
        <panes>
          <pane>
            <mark class='Bar' />
            <encodings>
              <color column='[ds].[sum:Profit:qk]' />
            </encodings>
          </pane>
        </panes>
        <rows>[ds].[none:Region:nk]</rows>
        <cols>[ds].[sum:Sales:qk]</cols>
      </table>
    </worksheet>
  </worksheets>
  <windows>
    <window class='worksheet' name='Sales by Region'>
      <viewpoint>
        <zoom type='entire-view' />
      </viewpoint>
    </window>
  </windows>
</workbook>"#;

/// Zip the markup the way the workbook platform packages `.twbx` files.
pub fn packaged_workbook(markup: &str) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("Regional Sales.twb", options).unwrap();
        writer.write_all(markup.as_bytes()).unwrap();
        writer.start_file("Data/Extracts/orders.hyper", options).unwrap();
        writer.write_all(b"extract").unwrap();
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

pub fn superstore_model() -> SemanticModel {
    serde_json::from_value(json!({
        "apiName": "Superstore_Model",
        "label": "Superstore",
        "semanticDataObjects": [{
            "id": "0Sx-orders",
            "apiName": "Orders",
            "semanticDimensions": [
                { "apiName": "Region", "dataObjectFieldName": "Region__c", "displayCategory": "Discrete", "id": "d1" },
                { "apiName": "Category", "dataObjectFieldName": "Category__c", "displayCategory": "Discrete", "id": "d2" }
            ],
            "semanticMeasurements": [
                { "apiName": "Sales2", "dataObjectFieldName": "Sales__c", "displayCategory": "Continuous", "id": "m1" },
                { "apiName": "Profit", "dataObjectFieldName": "Profit__c", "displayCategory": "Continuous", "id": "m2" }
            ]
        }]
    }))
    .unwrap()
}

pub fn workbook_dashboard() -> DashboardNode {
    serde_json::from_value(json!({
        "luid": "wb-dash-1",
        "name": "Regional Sales",
        "sheets": [
            { "name": "Sales by Region", "sheetFieldInstances": [{ "name": "Region" }, { "name": "Sales" }] }
        ]
    }))
    .unwrap()
}

pub fn workbook_lineage() -> DashboardLineage {
    serde_json::from_value(json!({
        "luid": "wb-dash-1",
        "name": "Regional Sales",
        "upstreamDatasources": [{ "id": "ds-1", "name": "Superstore" }],
        "workbook": { "luid": "wb-1", "name": "Regional Sales" },
        "sheets": [{ "name": "Sales by Region" }]
    }))
    .unwrap()
}

pub struct MockWorkbook {
    pub reachable: bool,
    pub dashboards: Vec<DashboardNode>,
    pub lineage: Option<DashboardLineage>,
    pub document: DownloadedDocument,
    pub image_requests: Mutex<Vec<String>>,
}

impl MockWorkbook {
    pub fn new() -> Self {
        Self {
            reachable: true,
            dashboards: vec![workbook_dashboard()],
            lineage: Some(workbook_lineage()),
            document: DownloadedDocument {
                filename: "Regional Sales.twbx".into(),
                bytes: packaged_workbook(WORKBOOK_MARKUP),
            },
            image_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    fn check(&self) -> BridgeResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(BridgeError::connectivity(Platform::Workbook, "connection refused"))
        }
    }

    pub fn image_requests(&self) -> Vec<String> {
        self.image_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkbookPlatform for MockWorkbook {
    async fn dashboards(&self) -> BridgeResult<Vec<DashboardNode>> {
        self.check()?;
        Ok(self.dashboards.clone())
    }

    async fn dashboard(&self, luid: &str) -> BridgeResult<Option<DashboardNode>> {
        self.check()?;
        Ok(self.dashboards.iter().find(|d| d.luid == luid).cloned())
    }

    async fn dashboard_lineage(&self, luid: &str) -> BridgeResult<Option<DashboardLineage>> {
        self.check()?;
        Ok(self.lineage.clone().filter(|l| l.luid == luid))
    }

    async fn download_workbook(&self, _workbook_luid: &str) -> BridgeResult<DownloadedDocument> {
        self.check()?;
        Ok(self.document.clone())
    }

    async fn view_image(&self, view_luid: &str) -> BridgeResult<Vec<u8>> {
        self.check()?;
        self.image_requests.lock().unwrap().push(view_luid.to_string());
        Ok(b"\x89PNG workbook".to_vec())
    }
}

pub struct MockSemantic {
    pub reachable: bool,
    pub models: Vec<SemanticModelSummary>,
    pub model: SemanticModel,
    pub workspaces: Vec<Workspace>,
    /// Assets per workspace id.
    pub assets: Vec<(String, Asset)>,
    /// When false, created visualizations cannot be read back.
    pub stores_created: bool,
    pub created: Mutex<Vec<VisualSpecDraft>>,
    pub image_requests: Mutex<Vec<Asset>>,
}

impl MockSemantic {
    pub fn new() -> Self {
        Self {
            reachable: true,
            models: vec![
                SemanticModelSummary {
                    api_name: "Other_Model".into(),
                    label: "superstore".into(),
                },
                SemanticModelSummary {
                    api_name: "Superstore_Model".into(),
                    label: "Superstore".into(),
                },
            ],
            model: superstore_model(),
            workspaces: vec![Workspace {
                id: "ws-1".into(),
                name: "Rebuilt_Charts".into(),
                label: "Rebuilt Charts".into(),
            }],
            assets: vec![
                (
                    "ws-1".into(),
                    Asset::Dashboard {
                        id: "sem-dash-1".into(),
                        api_name: "Profit_Overview".into(),
                    },
                ),
                ("ws-1".into(), Asset::Metric { id: "metric-7".into() }),
                ("ws-2".into(), Asset::Metric { id: "metric-9".into() }),
            ],
            stores_created: true,
            created: Mutex::new(Vec::new()),
            image_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    fn check(&self) -> BridgeResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(BridgeError::connectivity(Platform::Semantic, "token request timed out"))
        }
    }

    pub fn created(&self) -> Vec<VisualSpecDraft> {
        self.created.lock().unwrap().clone()
    }

    pub fn image_requests(&self) -> Vec<Asset> {
        self.image_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticPlatform for MockSemantic {
    async fn semantic_models(&self) -> BridgeResult<Vec<SemanticModelSummary>> {
        self.check()?;
        Ok(self.models.clone())
    }

    async fn semantic_model(&self, api_name: &str) -> BridgeResult<SemanticModel> {
        self.check()?;
        if api_name == self.model.api_name {
            Ok(self.model.clone())
        } else {
            Err(BridgeError::NotFound(format!("semantic model {}", api_name)))
        }
    }

    async fn dashboards(&self) -> BridgeResult<Vec<DashboardRecord>> {
        self.check()?;
        Ok(serde_json::from_value(json!([
            { "Id": "sem-dash-1", "MasterLabel": "Profit Overview", "DeveloperName": "Profit_Overview" }
        ]))
        .unwrap())
    }

    async fn dashboard_widgets(&self) -> BridgeResult<Vec<DashboardWidgetRecord>> {
        self.check()?;
        Ok(serde_json::from_value(json!([
            { "Id": "w-1", "AnalyticsDashboardId": "sem-dash-1", "Type": "visualization" }
        ]))
        .unwrap())
    }

    async fn viz_widget_definitions(&self) -> BridgeResult<Vec<VizWidgetDefinitionRecord>> {
        self.check()?;
        Ok(serde_json::from_value(json!([
            { "AnalyticsDashboardWidgetId": "w-1", "AnalyticsVisualizationId": "v-1" }
        ]))
        .unwrap())
    }

    async fn visualizations(&self) -> BridgeResult<Vec<VisualizationSummary>> {
        self.check()?;
        Ok(serde_json::from_value(json!([
            { "id": "v-1", "label": "Profit by Category", "fields": { "F1": { "fieldName": "Profit" }, "F2": { "fieldName": "Category" } } }
        ]))
        .unwrap())
    }

    async fn visualization(&self, id_or_name: &str) -> BridgeResult<VisualSpecDraft> {
        self.check()?;
        if !self.stores_created {
            return Err(BridgeError::NotFound(format!("visualization {}", id_or_name)));
        }
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == id_or_name)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("visualization {}", id_or_name)))
    }

    async fn workspaces(&self) -> BridgeResult<Vec<Workspace>> {
        self.check()?;
        Ok(self.workspaces.clone())
    }

    async fn workspace_assets(&self, workspace_id: &str) -> BridgeResult<Vec<Asset>> {
        self.check()?;
        Ok(self
            .assets
            .iter()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, asset)| asset.clone())
            .collect())
    }

    async fn download_image(&self, asset: &Asset) -> BridgeResult<Vec<u8>> {
        self.check()?;
        self.image_requests.lock().unwrap().push(asset.clone());
        Ok(b"\x89PNG semantic".to_vec())
    }

    async fn create_visualization(&self, draft: &VisualSpecDraft) -> BridgeResult<CreatedVisualization> {
        self.check()?;
        self.created.lock().unwrap().push(draft.clone());
        Ok(CreatedVisualization {
            id: "viz-new".into(),
            name: draft.name.clone(),
            label: draft.label.clone(),
            edit_url: None,
        })
    }
}

/// Ranking oracle answering with a fixed JSON id.
pub struct FixedRanking {
    pub id: Option<Value>,
    pub seen: Mutex<Vec<VisualizationCandidate>>,
}

impl FixedRanking {
    pub fn answering(id: Value) -> Self {
        Self {
            id: Some(id),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<VisualizationCandidate> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RankingOracle for FixedRanking {
    async fn rank(
        &self,
        _question: &str,
        candidates: &[VisualizationCandidate],
    ) -> BridgeResult<RankingResponse> {
        *self.seen.lock().unwrap() = candidates.to_vec();
        Ok(RankingResponse { id: self.id.clone() })
    }
}

#[derive(Default)]
pub struct EchoCommentary {
    pub calls: AtomicUsize,
}

impl EchoCommentary {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentaryOracle for EchoCommentary {
    async fn comment(&self, image: &[u8], prompt: &str) -> BridgeResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} bytes; {}", image.len(), prompt))
    }
}

/// Data service returning scripted results and counting calls.
pub struct ScriptedDataService {
    pub results: Mutex<Vec<QueryResult>>,
    pub queries: Mutex<Vec<DataQuery>>,
}

impl ScriptedDataService {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self {
            results: Mutex::new(results),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<DataQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataQueryService for ScriptedDataService {
    async fn query(&self, _datasource_luid: &str, query: &DataQuery) -> BridgeResult<QueryResult> {
        self.queries.lock().unwrap().push(query.clone());
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(QueryResult::default())
        } else {
            Ok(results.remove(0))
        }
    }
}
