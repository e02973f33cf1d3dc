//! Structured data queries against a published data source, with the
//! one-shot "drop the filters and try again" fallback for empty results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryField {
    pub field_caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_decimal_places: Option<u32>,
}

impl QueryField {
    pub fn caption(caption: impl Into<String>) -> Self {
        Self {
            field_caption: caption.into(),
            function: None,
            max_decimal_places: None,
        }
    }

    pub fn aggregated(caption: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::caption(caption)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterType {
    Set,
    Top,
    Match,
    QuantitativeNumerical,
    QuantitativeDate,
    Date,
}

/// One filter. Options specific to the filter type (`values`, `howMany`,
/// `min`, `periodType`, ...) are carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub field: QueryField,
    pub filter_type: FilterType,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    pub fields: Vec<QueryField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<QueryFilter>,
}

impl DataQuery {
    pub fn without_filters(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, rename = "data")]
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What the fallback produced and whether filters had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub result: QueryResult,
    pub filters_dropped: bool,
}

#[async_trait]
pub trait DataQueryService: Send + Sync {
    async fn query(&self, datasource_luid: &str, query: &DataQuery) -> BridgeResult<QueryResult>;
}

/// Run a query; when it returns no rows while filters are applied, re-issue it
/// once without filters. Still empty after that is `PartialData`.
pub async fn query_with_filter_fallback(
    service: &dyn DataQueryService,
    datasource_luid: &str,
    query: &DataQuery,
) -> BridgeResult<QueryOutcome> {
    let result = service.query(datasource_luid, query).await?;
    if !result.is_empty() || query.filters.is_empty() {
        return Ok(QueryOutcome {
            result,
            filters_dropped: false,
        });
    }

    warn!(
        datasource = datasource_luid,
        filters = query.filters.len(),
        "Query returned no rows with filters applied; retrying without filters"
    );
    let retry = service
        .query(datasource_luid, &query.without_filters())
        .await?;
    if retry.is_empty() {
        return Err(BridgeError::PartialData(format!(
            "data source {} returned no rows, even without filters",
            datasource_luid
        )));
    }

    info!(datasource = datasource_luid, rows = retry.rows.len(), "Unfiltered retry returned data");
    Ok(QueryOutcome {
        result: retry,
        filters_dropped: true,
    })
}
