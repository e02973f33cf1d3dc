//! Metadata (GraphQL) queries against the workbook platform.
//!
//! Queries are written without arguments on their root connection. Before
//! sending, the root connection gets either pagination arguments or a single
//! equality filter injected, and paginated results are collected by following
//! `pageInfo { hasNextPage, endCursor }`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::Platform;
use crate::error::{BridgeError, BridgeResult};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static QUERY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^query\s+(\w+)\s*\{").expect("query name pattern is valid"));

/// Dashboards with their sheets and the field instances used on each sheet.
pub const DASHBOARDS_SHEETS_AND_FIELDS: &str = r#"
query dashboardsSheetsAndFields {
    dashboardsConnection {
        nodes {
            luid
            name
            sheets {
                name
                sheetFieldInstances {
                    name
                }
            }
        }
        pageInfo {
            hasNextPage
            endCursor
        }
    }
}
"#;

/// Dashboards with their upstream data sources and owning workbook.
pub const DASHBOARDS_AND_DATASOURCES: &str = r#"
query dashboardsAndDataSources {
    dashboardsConnection {
        nodes {
            luid
            name
            upstreamDatasources {
                id
                name
            }
            workbook {
                luid
                name
            }
            sheets {
                name
            }
        }
        pageInfo {
            hasNextPage
            endCursor
        }
    }
}
"#;

/// A raw query split around its root connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryComponents {
    pub name: String,
    /// `{ dashboardsConnection ` (up to the root's own selection set)
    pub root_part: String,
    pub root_name: String,
    /// Everything from the root's selection set to the end
    pub remainder: String,
}

/// Arguments injected on the root connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope<'a> {
    Page { first: u32, after: Option<&'a str> },
    Filter { key: &'a str, value: &'a str },
}

impl QueryComponents {
    pub fn parse(raw_query: &str) -> BridgeResult<Self> {
        let query = WHITESPACE.replace_all(raw_query, " ").trim().to_string();

        let name = QUERY_NAME
            .captures(&query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| BridgeError::parse("metadata query has no name"))?;

        let body_start = query
            .find('{')
            .ok_or_else(|| BridgeError::parse(format!("metadata query {} has no body", name)))?;
        let body = &query[body_start..];
        let root_end = body[1..]
            .find('{')
            .map(|i| i + 1)
            .ok_or_else(|| BridgeError::parse(format!("metadata query {} has no root selection", name)))?;

        let root_part = body[..root_end].to_string();
        let root_name: String = root_part
            .chars()
            .filter(|c| *c != '{' && !c.is_whitespace())
            .collect();
        if root_name.is_empty() {
            return Err(BridgeError::parse(format!(
                "metadata query {} has no root connection",
                name
            )));
        }

        Ok(Self {
            name,
            root_part,
            root_name,
            remainder: body[root_end..].to_string(),
        })
    }

    pub fn render(&self, scope: QueryScope<'_>) -> String {
        let arguments = match scope {
            QueryScope::Page { first, after } => {
                let after = after
                    .map(|cursor| format!(", after: \"{}\"", escape(cursor)))
                    .unwrap_or_default();
                format!(
                    "(first: {}{}, orderBy: {{ field: ID, direction: ASC }})",
                    first, after
                )
            }
            QueryScope::Filter { key, value } => {
                format!("(filter: {{ {}: \"{}\" }})", key, escape(value))
            }
        };
        format!(
            "query {} {}{}{}",
            self.name, self.root_part, arguments, self.remainder
        )
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionPage<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
    #[serde(default)]
    page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetNode {
    pub name: String,
    #[serde(default)]
    pub sheet_field_instances: Vec<NamedNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardNode {
    pub luid: String,
    pub name: String,
    #[serde(default)]
    pub sheets: Vec<SheetNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamDatasource {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookRef {
    pub luid: String,
    pub name: String,
}

/// Where a dashboard's data comes from and which workbook owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardLineage {
    pub luid: String,
    pub name: String,
    #[serde(default)]
    pub upstream_datasources: Vec<UpstreamDatasource>,
    pub workbook: Option<WorkbookRef>,
    #[serde(default)]
    pub sheets: Vec<NamedNode>,
}

/// Sends one GraphQL document and returns the raw JSON response.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn post_query(&self, query: String) -> BridgeResult<serde_json::Value>;
}

/// Run a metadata query, either paginated or restricted by one filter, and
/// collect every node.
pub async fn query_nodes<T: DeserializeOwned>(
    transport: &dyn GraphqlTransport,
    raw_query: &str,
    filter: Option<(&str, &str)>,
    page_size: u32,
) -> BridgeResult<Vec<T>> {
    let components = QueryComponents::parse(raw_query)?;
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 1;

    loop {
        let scope = match filter {
            Some((key, value)) => QueryScope::Filter { key, value },
            None => QueryScope::Page {
                first: page_size,
                after: cursor.as_deref(),
            },
        };
        let query = components.render(scope);
        debug!(query = %components.name, page, "Running metadata query");

        let response = transport.post_query(query).await?;
        let connection = connection_from_response::<T>(&response, &components)?;
        results.extend(connection.nodes);

        if filter.is_some() || !connection.page_info.has_next_page {
            break;
        }
        match connection.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!(query = %components.name, page, "Page reports more results but no cursor; stopping");
                break;
            }
        }
        page += 1;
    }

    Ok(results)
}

fn connection_from_response<T: DeserializeOwned>(
    response: &serde_json::Value,
    components: &QueryComponents,
) -> BridgeResult<ConnectionPage<T>> {
    let root = response
        .get("data")
        .and_then(|d| d.get(&components.root_name))
        .filter(|r| !r.is_null());

    let Some(root) = root else {
        let errors = response
            .get("errors")
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no data in response".to_string());
        return Err(BridgeError::connectivity(
            Platform::Workbook,
            format!("metadata query {} failed: {}", components.name, errors),
        ));
    };

    serde_json::from_value(root.clone()).map_err(|e| {
        BridgeError::parse(format!(
            "unexpected shape in {} response: {}",
            components.name, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_parse_components() {
        let components = QueryComponents::parse(DASHBOARDS_SHEETS_AND_FIELDS).unwrap();
        assert_eq!(components.name, "dashboardsSheetsAndFields");
        assert_eq!(components.root_name, "dashboardsConnection");
        assert_eq!(components.root_part, "{ dashboardsConnection ");
        assert!(components.remainder.starts_with("{ nodes { luid name"));
    }

    #[test]
    fn test_render_pagination_and_filter() {
        let components = QueryComponents::parse("query q { things { nodes { id } } }").unwrap();
        assert_eq!(
            components.render(QueryScope::Page { first: 10, after: None }),
            "query q { things (first: 10, orderBy: { field: ID, direction: ASC }){ nodes { id } } }"
        );
        assert_eq!(
            components.render(QueryScope::Page { first: 10, after: Some("abc") }),
            "query q { things (first: 10, after: \"abc\", orderBy: { field: ID, direction: ASC }){ nodes { id } } }"
        );
        assert_eq!(
            components.render(QueryScope::Filter { key: "luid", value: "x\"1" }),
            "query q { things (filter: { luid: \"x\\\"1\" }){ nodes { id } } }"
        );
    }

    #[test]
    fn test_parse_rejects_unnamed_query() {
        assert!(QueryComponents::parse("{ things { id } }").is_err());
    }

    struct ScriptedTransport {
        pages: Mutex<Vec<serde_json::Value>>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GraphqlTransport for ScriptedTransport {
        async fn post_query(&self, query: String) -> BridgeResult<serde_json::Value> {
            self.seen.lock().unwrap().push(query);
            let mut pages = self.pages.lock().unwrap();
            Ok(pages.remove(0))
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> serde_json::Value {
        let nodes: Vec<_> = names
            .iter()
            .map(|n| json!({ "luid": format!("{}-id", n), "name": n, "sheets": [] }))
            .collect();
        json!({ "data": { "dashboardsConnection": {
            "nodes": nodes,
            "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
        }}})
    }

    #[tokio::test]
    async fn test_query_nodes_follows_cursor() {
        let transport = ScriptedTransport {
            pages: Mutex::new(vec![page(&["A", "B"], Some("c1")), page(&["C"], None)]),
            seen: Mutex::new(Vec::new()),
        };
        let nodes: Vec<DashboardNode> =
            query_nodes(&transport, DASHBOARDS_SHEETS_AND_FIELDS, None, 2)
                .await
                .unwrap();
        assert_eq!(
            nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].contains("after: \"c1\""));
    }

    #[tokio::test]
    async fn test_missing_cursor_ends_loop() {
        let broken = json!({ "data": { "dashboardsConnection": {
            "nodes": [{ "luid": "1", "name": "A" }],
            "pageInfo": { "hasNextPage": true, "endCursor": null }
        }}});
        let transport = ScriptedTransport {
            pages: Mutex::new(vec![broken]),
            seen: Mutex::new(Vec::new()),
        };
        let nodes: Vec<DashboardNode> =
            query_nodes(&transport, DASHBOARDS_SHEETS_AND_FIELDS, None, 10)
                .await
                .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_graphql_errors_are_connectivity_failures() {
        let transport = ScriptedTransport {
            pages: Mutex::new(vec![json!({ "errors": [{ "message": "denied" }] })]),
            seen: Mutex::new(Vec::new()),
        };
        let result: BridgeResult<Vec<DashboardNode>> = query_nodes(
            &transport,
            DASHBOARDS_AND_DATASOURCES,
            Some(("luid", "abc")),
            10,
        )
        .await;
        assert!(matches!(result, Err(BridgeError::Connectivity { .. })));
        assert!(transport.seen.lock().unwrap()[0].contains("(filter: { luid: \"abc\" })"));
    }
}
