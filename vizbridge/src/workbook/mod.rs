//! The workbook platform: XML workbooks, a GraphQL metadata API and a REST
//! content API.

pub mod document;
pub mod metadata;
pub mod package;
pub mod rest;

use async_trait::async_trait;

use crate::error::BridgeResult;
pub use document::{WorkbookDocument, Worksheet};
pub use metadata::{DashboardLineage, DashboardNode};
pub use package::DownloadedDocument;
pub use rest::WorkbookRestClient;

/// Everything the pipeline reads from the workbook platform.
#[async_trait]
pub trait WorkbookPlatform: Send + Sync {
    /// All dashboards with their sheets and field instances.
    async fn dashboards(&self) -> BridgeResult<Vec<DashboardNode>>;

    /// One dashboard with its sheets, looked up by LUID.
    async fn dashboard(&self, luid: &str) -> BridgeResult<Option<DashboardNode>>;

    /// Upstream data sources and owning workbook of one dashboard.
    async fn dashboard_lineage(&self, luid: &str) -> BridgeResult<Option<DashboardLineage>>;

    /// Download a workbook without its extracts.
    async fn download_workbook(&self, workbook_luid: &str) -> BridgeResult<DownloadedDocument>;

    /// Rendered PNG of a view or dashboard.
    async fn view_image(&self, view_luid: &str) -> BridgeResult<Vec<u8>>;
}
