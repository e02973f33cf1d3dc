//! HTTP client for the workbook platform.
//!
//! Signs in lazily with a personal access token on first use and reuses the
//! session token (`X-Tableau-Auth`) for the REST, metadata and data-service
//! endpoints.

use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::candidate::Platform;
use crate::config::{secret_from_env, BridgeConfig, WorkbookPlatformConfig};
use crate::data_query::{DataQuery, DataQueryService, QueryResult};
use crate::error::{ensure_success, BridgeError, BridgeResult};
use crate::workbook::metadata::{
    query_nodes, DashboardLineage, DashboardNode, GraphqlTransport, DASHBOARDS_AND_DATASOURCES,
    DASHBOARDS_SHEETS_AND_FIELDS,
};
use crate::workbook::package::{filename_from_disposition, DownloadedDocument};
use crate::workbook::WorkbookPlatform;

const AUTH_HEADER: &str = "X-Tableau-Auth";

#[derive(Debug, Clone)]
struct WorkbookSession {
    token: String,
    site_id: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    credentials: SignInCredentials,
}

#[derive(Debug, Deserialize)]
struct SignInCredentials {
    token: String,
    site: SignInSite,
}

#[derive(Debug, Deserialize)]
struct SignInSite {
    id: String,
}

pub struct WorkbookRestClient {
    config: WorkbookPlatformConfig,
    pat_secret: String,
    page_size: u32,
    client: Client,
    session: OnceCell<WorkbookSession>,
}

impl WorkbookRestClient {
    pub fn new(
        config: WorkbookPlatformConfig,
        pat_secret: String,
        page_size: u32,
    ) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;

        Ok(Self {
            config,
            pat_secret,
            page_size,
            client,
            session: OnceCell::new(),
        })
    }

    /// Build from the bridge configuration, reading the token secret from
    /// the environment.
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let secret = secret_from_env(&config.workbook.pat_secret_env)?;
        Self::new(
            config.workbook.clone(),
            secret,
            config.pipeline.metadata_page_size,
        )
    }

    fn server_url(&self) -> &str {
        self.config.server_url.trim_end_matches('/')
    }

    fn api_url(&self) -> String {
        format!("{}/api/{}", self.server_url(), self.config.api_version)
    }

    async fn session(&self) -> BridgeResult<&WorkbookSession> {
        self.session.get_or_try_init(|| self.sign_in()).await
    }

    async fn sign_in(&self) -> BridgeResult<WorkbookSession> {
        let url = format!("{}/auth/signin", self.api_url());
        info!(server = self.server_url(), site = %self.config.site_content_url, "Signing in to workbook platform");

        let body = json!({
            "credentials": {
                "personalAccessTokenName": self.config.pat_name,
                "personalAccessTokenSecret": self.pat_secret,
                "site": { "contentUrl": self.config.site_content_url }
            }
        });
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        let response = ensure_success(Platform::Workbook, response, "sign-in").await?;

        let parsed: SignInResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        debug!(site_id = %parsed.credentials.site.id, "Signed in");

        Ok(WorkbookSession {
            token: parsed.credentials.token,
            site_id: parsed.credentials.site.id,
        })
    }

    async fn get_bytes(&self, url: &str, context: &str) -> BridgeResult<(Option<String>, Vec<u8>)> {
        let session = self.session().await?;
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, &session.token)
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        let response = ensure_success(Platform::Workbook, response, context).await?;

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        Ok((disposition, bytes.to_vec()))
    }
}

#[async_trait]
impl GraphqlTransport for WorkbookRestClient {
    async fn post_query(&self, query: String) -> BridgeResult<serde_json::Value> {
        let session = self.session().await?;
        let url = format!("{}/api/metadata/graphql", self.server_url());
        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, &session.token)
            .header("Accept", "application/json")
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        let response = ensure_success(Platform::Workbook, response, "metadata query").await?;
        response
            .json()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))
    }
}

#[async_trait]
impl WorkbookPlatform for WorkbookRestClient {
    async fn dashboards(&self) -> BridgeResult<Vec<DashboardNode>> {
        query_nodes(self, DASHBOARDS_SHEETS_AND_FIELDS, None, self.page_size).await
    }

    async fn dashboard(&self, luid: &str) -> BridgeResult<Option<DashboardNode>> {
        let nodes: Vec<DashboardNode> = query_nodes(
            self,
            DASHBOARDS_SHEETS_AND_FIELDS,
            Some(("luid", luid)),
            self.page_size,
        )
        .await?;
        Ok(nodes.into_iter().next())
    }

    async fn dashboard_lineage(&self, luid: &str) -> BridgeResult<Option<DashboardLineage>> {
        let nodes: Vec<DashboardLineage> = query_nodes(
            self,
            DASHBOARDS_AND_DATASOURCES,
            Some(("luid", luid)),
            self.page_size,
        )
        .await?;
        Ok(nodes.into_iter().next())
    }

    async fn download_workbook(&self, workbook_luid: &str) -> BridgeResult<DownloadedDocument> {
        let site_id = self.session().await?.site_id.clone();
        let url = format!(
            "{}/sites/{}/workbooks/{}/content?includeExtract=False",
            self.api_url(),
            site_id,
            workbook_luid
        );
        let (disposition, bytes) = self
            .get_bytes(&url, &format!("workbook {}", workbook_luid))
            .await?;
        let filename = filename_from_disposition(disposition.as_deref());
        info!(workbook = workbook_luid, file = %filename, size = bytes.len(), "Downloaded workbook");
        Ok(DownloadedDocument { filename, bytes })
    }

    async fn view_image(&self, view_luid: &str) -> BridgeResult<Vec<u8>> {
        let site_id = self.session().await?.site_id.clone();
        let url = format!("{}/sites/{}/views/{}/image", self.api_url(), site_id, view_luid);
        let (_, bytes) = self
            .get_bytes(&url, &format!("image of view {}", view_luid))
            .await?;
        Ok(bytes)
    }
}

#[async_trait]
impl DataQueryService for WorkbookRestClient {
    async fn query(&self, datasource_luid: &str, query: &DataQuery) -> BridgeResult<QueryResult> {
        let session = self.session().await?;
        let url = format!(
            "{}/api/v1/vizql-data-service/query-datasource",
            self.server_url()
        );
        let body = json!({
            "datasource": { "datasourceLuid": datasource_luid },
            "query": query,
        });
        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, &session.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))?;
        let response = ensure_success(Platform::Workbook, response, "data query").await?;
        response
            .json()
            .await
            .map_err(|e| BridgeError::http(Platform::Workbook, e))
    }
}
