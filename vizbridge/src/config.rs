//! Configuration for both platform connections, the LLM oracles, and
//! pipeline behaviour.
//!
//! Loaded from a TOML file and overlaid with `VIZBRIDGE_*` environment
//! variables. Secrets are never stored in the file; each section names the
//! environment variable that holds its secret.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub workbook: WorkbookPlatformConfig,
    #[serde(default)]
    pub semantic: SemanticPlatformConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Connection settings for the workbook platform (REST + metadata API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookPlatformConfig {
    pub server_url: String,
    #[serde(default = "default_workbook_api_version")]
    pub api_version: String,
    /// Site content URL; empty for the default site
    #[serde(default)]
    pub site_content_url: String,
    pub pat_name: String,
    #[serde(default = "default_pat_secret_env")]
    pub pat_secret_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for WorkbookPlatformConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_version: default_workbook_api_version(),
            site_content_url: String::new(),
            pat_name: String::new(),
            pat_secret_env: default_pat_secret_env(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Connection settings for the semantic platform (OAuth client credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticPlatformConfig {
    /// Org login domain, e.g. `https://example.my.salesforce.com/`
    pub org_domain: String,
    #[serde(default = "default_semantic_api_version")]
    pub api_version: String,
    pub client_id: String,
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SemanticPlatformConfig {
    fn default() -> Self {
        Self {
            org_domain: String::new(),
            api_version: default_semantic_api_version(),
            client_id: String::new(),
            client_secret_env: default_client_secret_env(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint used by both oracles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_key_env: default_llm_key_env(),
            base_url: None,
            max_tokens: None,
            temperature: Some(0.5),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_page_size")]
    pub metadata_page_size: u32,
    /// Workspace on the semantic platform that receives rebuilt charts
    #[serde(default)]
    pub target_workspace: String,
    #[serde(default = "default_label_suffix")]
    pub rebuilt_label_suffix: String,
    /// User-facing names, also used to detect scope phrases in questions
    #[serde(default = "default_workbook_display_name")]
    pub workbook_display_name: String,
    #[serde(default = "default_semantic_display_name")]
    pub semantic_display_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata_page_size: default_page_size(),
            target_workspace: String::new(),
            rebuilt_label_suffix: default_label_suffix(),
            workbook_display_name: default_workbook_display_name(),
            semantic_display_name: default_semantic_display_name(),
        }
    }
}

fn default_workbook_api_version() -> String {
    "3.24".to_string()
}
fn default_semantic_api_version() -> String {
    "v64.0".to_string()
}
fn default_pat_secret_env() -> String {
    "VIZBRIDGE_WORKBOOK_PAT_SECRET".to_string()
}
fn default_client_secret_env() -> String {
    "VIZBRIDGE_SEMANTIC_CLIENT_SECRET".to_string()
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout() -> u64 {
    60
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_page_size() -> u32 {
    666
}
fn default_label_suffix() -> String {
    "[Rebuilt]".to_string()
}
fn default_workbook_display_name() -> String {
    "Tableau Cloud".to_string()
}
fn default_semantic_display_name() -> String {
    "Tableau Next".to_string()
}

impl BridgeConfig {
    /// Create a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            BridgeError::Config(format!(
                "invalid configuration in {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Overlay values from `VIZBRIDGE_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok());
        self
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("VIZBRIDGE_WORKBOOK_SERVER_URL") {
            self.workbook.server_url = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_WORKBOOK_SITE") {
            self.workbook.site_content_url = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_WORKBOOK_PAT_NAME") {
            self.workbook.pat_name = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_SEMANTIC_ORG_DOMAIN") {
            self.semantic.org_domain = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_SEMANTIC_CLIENT_ID") {
            self.semantic.client_id = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("VIZBRIDGE_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = lookup("VIZBRIDGE_TARGET_WORKSPACE") {
            self.pipeline.target_workspace = v;
        }
        if let Some(size) = lookup("VIZBRIDGE_METADATA_PAGE_SIZE").and_then(|s| s.parse().ok()) {
            self.pipeline.metadata_page_size = size;
        }
    }

    /// Check that everything needed to talk to both platforms is present.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.workbook.server_url.is_empty() {
            return Err(BridgeError::Config("workbook.server_url is not set".into()));
        }
        if self.semantic.org_domain.is_empty() {
            return Err(BridgeError::Config("semantic.org_domain is not set".into()));
        }
        if self.pipeline.metadata_page_size == 0 {
            return Err(BridgeError::Config(
                "pipeline.metadata_page_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Read a secret from the environment variable a config section points at.
pub fn secret_from_env(var_name: &str) -> BridgeResult<String> {
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::Config(format!("environment variable {} is not set", var_name)))
}
