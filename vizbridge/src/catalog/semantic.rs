//! Semantic platform catalog.
//!
//! Three entity queries (dashboards, dashboard widgets, widget visualization
//! definitions) and the visualization listing are joined in memory:
//! dashboard → widgets of type `visualization` → definitions of each widget →
//! visualizations referenced by those definitions.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::CatalogSource;
use crate::candidate::{Platform, VisualizationCandidate};
use crate::error::BridgeResult;
use crate::semantic::{
    DashboardRecord, DashboardWidgetRecord, SemanticPlatform, VisualizationSummary,
    VizWidgetDefinitionRecord,
};

pub struct SemanticCatalog {
    platform: Arc<dyn SemanticPlatform>,
}

impl SemanticCatalog {
    pub fn new(platform: Arc<dyn SemanticPlatform>) -> Self {
        Self { platform }
    }
}

/// Attach each dashboard's visualizations and their field names.
pub fn join_dashboards(
    dashboards: &[DashboardRecord],
    widgets: &[DashboardWidgetRecord],
    definitions: &[VizWidgetDefinitionRecord],
    visualizations: &[VisualizationSummary],
) -> Vec<VisualizationCandidate> {
    let mut widgets_by_dashboard: HashMap<&str, Vec<&DashboardWidgetRecord>> = HashMap::new();
    for widget in widgets.iter().filter(|w| w.is_visualization()) {
        if let Some(dashboard_id) = widget.dashboard_id.as_deref() {
            widgets_by_dashboard.entry(dashboard_id).or_default().push(widget);
        }
    }

    let mut definitions_by_widget: HashMap<&str, Vec<&VizWidgetDefinitionRecord>> = HashMap::new();
    for definition in definitions {
        if let Some(widget_id) = definition.widget_id.as_deref() {
            definitions_by_widget.entry(widget_id).or_default().push(definition);
        }
    }

    let visualizations_by_id: HashMap<&str, &VisualizationSummary> =
        visualizations.iter().map(|v| (v.id.as_str(), v)).collect();

    dashboards
        .iter()
        .map(|dashboard| {
            let contained: Vec<&VisualizationSummary> = widgets_by_dashboard
                .get(dashboard.id.as_str())
                .into_iter()
                .flatten()
                .flat_map(|widget| {
                    definitions_by_widget
                        .get(widget.id.as_str())
                        .into_iter()
                        .flatten()
                })
                .filter_map(|definition| {
                    definition
                        .visualization_id
                        .as_deref()
                        .and_then(|id| visualizations_by_id.get(id).copied())
                })
                .collect();

            let field_names: IndexSet<&str> =
                contained.iter().flat_map(|v| v.field_names()).collect();
            debug!(
                dashboard = %dashboard.id,
                visualizations = contained.len(),
                "Joined dashboard"
            );

            VisualizationCandidate {
                id: dashboard.id.clone(),
                label: dashboard.master_label.clone(),
                source_platform: Platform::Semantic,
                child_visualization_labels: contained.iter().map(|v| v.label.clone()).collect(),
                field_names: field_names.into_iter().map(str::to_string).collect(),
                asset: dashboard.asset(),
            }
        })
        .collect()
}

#[async_trait]
impl CatalogSource for SemanticCatalog {
    fn platform(&self) -> Platform {
        Platform::Semantic
    }

    async fn build(&self) -> BridgeResult<Vec<VisualizationCandidate>> {
        let (dashboards, widgets, definitions, visualizations) = futures::try_join!(
            self.platform.dashboards(),
            self.platform.dashboard_widgets(),
            self.platform.viz_widget_definitions(),
            self.platform.visualizations(),
        )?;

        Ok(join_dashboards(
            &dashboards,
            &widgets,
            &definitions,
            &visualizations,
        ))
    }
}
