//! Workbook platform catalog: one metadata query returns dashboards with
//! their sheets and field instances already joined.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::sync::Arc;

use super::CatalogSource;
use crate::candidate::{Asset, Platform, VisualizationCandidate};
use crate::error::BridgeResult;
use crate::workbook::{DashboardNode, WorkbookPlatform};

pub struct WorkbookCatalog {
    platform: Arc<dyn WorkbookPlatform>,
}

impl WorkbookCatalog {
    pub fn new(platform: Arc<dyn WorkbookPlatform>) -> Self {
        Self { platform }
    }
}

pub fn candidate_from_dashboard(dashboard: &DashboardNode) -> VisualizationCandidate {
    let field_names: IndexSet<&str> = dashboard
        .sheets
        .iter()
        .flat_map(|s| s.sheet_field_instances.iter().map(|f| f.name.as_str()))
        .collect();

    VisualizationCandidate {
        id: dashboard.luid.clone(),
        label: dashboard.name.clone(),
        source_platform: Platform::Workbook,
        child_visualization_labels: dashboard.sheets.iter().map(|s| s.name.clone()).collect(),
        field_names: field_names.into_iter().map(str::to_string).collect(),
        asset: Asset::View {
            luid: dashboard.luid.clone(),
        },
    }
}

#[async_trait]
impl CatalogSource for WorkbookCatalog {
    fn platform(&self) -> Platform {
        Platform::Workbook
    }

    async fn build(&self) -> BridgeResult<Vec<VisualizationCandidate>> {
        let dashboards = self.platform.dashboards().await?;
        Ok(dashboards.iter().map(candidate_from_dashboard).collect())
    }
}
