//! Rebuild orchestrator: recreates a workbook-platform dashboard's first sheet
//! as a semantic-platform visualization.
//!
//! The stages run strictly in order. A failure anywhere abandons the rebuild
//! and is reported with the stage it happened in; trying again starts over
//! from lineage lookup.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{BridgeError, BridgeResult, RebuildError, RebuildStage};
use crate::notify::{Notice, Notifier};
use crate::semantic::model::{SemanticDataObject, SemanticModel};
use crate::semantic::{find_workspace, CreatedVisualization, SemanticPlatform, Workspace};
use crate::visual::document::WorkspaceRef;
use crate::visual::{build_visual_spec, BuildOutput, BuildWarning, VisualSpecDraft};
use crate::workbook::{DashboardLineage, WorkbookDocument, WorkbookPlatform};

/// What a successful rebuild produced.
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub dashboard_name: String,
    pub created: CreatedVisualization,
    pub field_counter: u32,
    pub warnings: Vec<BuildWarning>,
    /// The stored visualization was read back and matches what was submitted.
    pub verified: bool,
}

pub struct RebuildOrchestrator {
    workbook: Arc<dyn WorkbookPlatform>,
    semantic: Arc<dyn SemanticPlatform>,
    config: PipelineConfig,
    notifier: Arc<dyn Notifier>,
}

trait StageContext<T> {
    fn at(self, stage: RebuildStage) -> Result<T, RebuildError>;
}

impl<T> StageContext<T> for BridgeResult<T> {
    fn at(self, stage: RebuildStage) -> Result<T, RebuildError> {
        self.map_err(|source| {
            error!(stage = %stage, error = %source, "Rebuild stage failed");
            RebuildError::new(stage, source)
        })
    }
}

impl RebuildOrchestrator {
    pub fn new(
        workbook: Arc<dyn WorkbookPlatform>,
        semantic: Arc<dyn SemanticPlatform>,
        config: PipelineConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            workbook,
            semantic,
            config,
            notifier,
        }
    }

    async fn enter(&self, stage: RebuildStage, dashboard_luid: &str) {
        info!(stage = %stage, dashboard = %dashboard_luid, "Rebuild stage");
        let message = match stage {
            RebuildStage::LocateLineage => "Looking up where the dashboard's data comes from...",
            RebuildStage::MatchSemanticModel => "Matching the data source to a semantic model...",
            RebuildStage::FetchSemanticMetadata => "Reading the semantic model...",
            RebuildStage::FetchAndUnpackDocument => "Downloading the workbook...",
            RebuildStage::ParseWorksheet => "Reading the worksheet...",
            RebuildStage::RunSpecBuilder => "Building the visualization...",
            RebuildStage::ResolveWorkspace => "Finding the target workspace...",
            RebuildStage::Submit => "Creating the visualization...",
        };
        self.notifier.notify(Notice::status(message)).await;
    }

    /// Run every stage for one dashboard.
    pub async fn rebuild(&self, dashboard_luid: &str) -> Result<RebuildOutcome, RebuildError> {
        use RebuildStage::*;

        self.enter(LocateLineage, dashboard_luid).await;
        let lineage = self.locate_lineage(dashboard_luid).await.at(LocateLineage)?;

        self.enter(MatchSemanticModel, dashboard_luid).await;
        let model_api_name = self.match_semantic_model(&lineage).await.at(MatchSemanticModel)?;

        self.enter(FetchSemanticMetadata, dashboard_luid).await;
        let model = self
            .semantic
            .semantic_model(&model_api_name)
            .await
            .at(FetchSemanticMetadata)?;
        let data_object = primary_data_object(&model).at(FetchSemanticMetadata)?;

        self.enter(FetchAndUnpackDocument, dashboard_luid).await;
        let markup = self.fetch_markup(&lineage).await.at(FetchAndUnpackDocument)?;

        self.enter(ParseWorksheet, dashboard_luid).await;
        let sheet_name = self.first_sheet_name(&lineage).await.at(ParseWorksheet)?;
        let document = WorkbookDocument::parse(&markup).at(ParseWorksheet)?;
        let worksheet = document
            .worksheet(&sheet_name)
            .ok_or_else(|| BridgeError::NotFound(format!("worksheet '{}' in the workbook", sheet_name)))
            .at(ParseWorksheet)?;

        self.enter(RunSpecBuilder, dashboard_luid).await;
        let BuildOutput {
            mut draft,
            field_counter,
            warnings,
        } = build_visual_spec(&worksheet, data_object);
        for warning in &warnings {
            self.notifier.notify(Notice::warning(warning.message.clone())).await;
        }

        self.enter(ResolveWorkspace, dashboard_luid).await;
        let workspace = self.resolve_workspace().await.at(ResolveWorkspace)?;

        self.enter(Submit, dashboard_luid).await;
        draft.set_label(&format!("{} {}", lineage.name, self.config.rebuilt_label_suffix));
        draft.workspace = Some(WorkspaceRef {
            name: workspace.name,
        });
        let created = self.semantic.create_visualization(&draft).await.at(Submit)?;
        let verified = self.verify_created(&created, &draft).await;

        info!(
            dashboard = %dashboard_luid,
            visualization = %created.name,
            fields = field_counter,
            warnings = warnings.len(),
            verified,
            "Rebuild complete"
        );
        Ok(RebuildOutcome {
            dashboard_name: lineage.name,
            created,
            field_counter,
            warnings,
            verified,
        })
    }

    /// Read the stored visualization back. The visualization already exists at
    /// this point, so a mismatch is reported but does not fail the rebuild.
    async fn verify_created(&self, created: &CreatedVisualization, submitted: &VisualSpecDraft) -> bool {
        let problem = match self.semantic.visualization(&created.name).await {
            Ok(stored) if !stored.dangling_keys().is_empty() => {
                Some("it references fields it does not define".to_string())
            }
            Ok(stored) if !stored.fields.keys().eq(submitted.fields.keys()) => Some(format!(
                "it holds {} fields instead of {}",
                stored.fields.len(),
                submitted.fields.len()
            )),
            Ok(_) => None,
            Err(e) => Some(format!("it could not be read back ({})", e)),
        };

        match problem {
            None => true,
            Some(problem) => {
                warn!(visualization = %created.name, problem = %problem, "Created visualization did not verify");
                self.notifier
                    .notify(Notice::warning(format!(
                        "Created \"{}\", but {}. Please check it in the editor.",
                        created.label, problem
                    )))
                    .await;
                false
            }
        }
    }

    async fn locate_lineage(&self, dashboard_luid: &str) -> BridgeResult<DashboardLineage> {
        let lineage = self
            .workbook
            .dashboard_lineage(dashboard_luid)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("dashboard '{}'", dashboard_luid)))?;
        if lineage.upstream_datasources.is_empty() {
            return Err(BridgeError::NotFound(format!(
                "an upstream data source for dashboard '{}'",
                lineage.name
            )));
        }
        Ok(lineage)
    }

    /// Exact, case-sensitive label match against the first upstream source.
    async fn match_semantic_model(&self, lineage: &DashboardLineage) -> BridgeResult<String> {
        let datasource = lineage
            .upstream_datasources
            .first()
            .ok_or_else(|| BridgeError::NotFound("an upstream data source".into()))?;
        let models = self.semantic.semantic_models().await?;
        models
            .into_iter()
            .find(|m| m.label == datasource.name)
            .map(|m| m.api_name)
            .ok_or_else(|| {
                BridgeError::NotFound(format!("a semantic model labelled '{}'", datasource.name))
            })
    }

    async fn fetch_markup(&self, lineage: &DashboardLineage) -> BridgeResult<String> {
        let workbook = lineage.workbook.as_ref().ok_or_else(|| {
            BridgeError::NotFound(format!("the workbook owning dashboard '{}'", lineage.name))
        })?;
        let document = self.workbook.download_workbook(&workbook.luid).await?;
        info!(
            workbook = %workbook.name,
            filename = %document.filename,
            bytes = document.bytes.len(),
            "Downloaded workbook"
        );
        document.markup()
    }

    /// Only the first sheet of a dashboard is rebuilt.
    async fn first_sheet_name(&self, lineage: &DashboardLineage) -> BridgeResult<String> {
        if let Some(sheet) = lineage.sheets.first() {
            return Ok(sheet.name.clone());
        }
        self.workbook
            .dashboard(&lineage.luid)
            .await?
            .and_then(|d| d.sheets.into_iter().next())
            .map(|s| s.name)
            .ok_or_else(|| BridgeError::NotFound(format!("a sheet on dashboard '{}'", lineage.name)))
    }

    async fn resolve_workspace(&self) -> BridgeResult<Workspace> {
        let wanted = self.config.target_workspace.trim();
        if wanted.is_empty() {
            return Err(BridgeError::Config("no target workspace is configured".into()));
        }
        find_workspace(self.semantic.as_ref(), wanted).await
    }
}

fn primary_data_object(model: &SemanticModel) -> BridgeResult<&SemanticDataObject> {
    model.primary_data_object().ok_or_else(|| {
        BridgeError::NotFound(format!("a data object in semantic model '{}'", model.api_name))
    })
}

/// Build a draft from workbook markup without contacting either platform.
pub fn build_from_markup(
    markup: &str,
    worksheet_name: Option<&str>,
    model: &SemanticModel,
) -> BridgeResult<BuildOutput> {
    let document = WorkbookDocument::parse(markup)?;
    let name = match worksheet_name {
        Some(name) => name.to_string(),
        None => document
            .worksheet_names()
            .first()
            .map(|n| n.to_string())
            .ok_or_else(|| BridgeError::NotFound("a worksheet in the workbook".into()))?,
    };
    let worksheet = document
        .worksheet(&name)
        .ok_or_else(|| BridgeError::NotFound(format!("worksheet '{}' in the workbook", name)))?;
    let data_object = primary_data_object(model)?;
    Ok(build_visual_spec(&worksheet, data_object))
}
