//! Question answering: catalog → selection → image → commentary, with an
//! optional rebuild offer for workbook-platform answers.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::candidate::{Asset, Platform, VisualizationCandidate};
use crate::catalog::{build_catalog, CatalogSource, SemanticCatalog, WorkbookCatalog};
use crate::config::PipelineConfig;
use crate::error::{BridgeError, BridgeResult, RebuildError};
use crate::notify::{Notice, Notifier};
use crate::oracle::{commentary_prompt, CommentaryOracle, RankingOracle};
use crate::rebuild::{RebuildOrchestrator, RebuildOutcome};
use crate::selection::SelectionEngine;
use crate::semantic::SemanticPlatform;
use crate::workbook::WorkbookPlatform;

/// Which platforms a question allows the catalog to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformScope {
    pub include_workbook: bool,
    pub include_semantic: bool,
}

impl Default for PlatformScope {
    fn default() -> Self {
        Self {
            include_workbook: true,
            include_semantic: true,
        }
    }
}

impl PlatformScope {
    /// Read phrases like "only <name>", "no <name>" or "<name> only" from the
    /// question, using the configured display names of the platforms. Cues and
    /// names only count as whole words.
    pub fn from_question(question: &str, config: &PipelineConfig) -> Self {
        let workbook = normalize_name(&config.workbook_display_name);
        let semantic = normalize_name(&config.semantic_display_name);

        let mut names: Vec<&str> = [workbook.as_str(), semantic.as_str()]
            .into_iter()
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Self::default();
        }
        // longest first, so "tableau next" wins over a plain "tableau"
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r"\b(?P<cue>no|not\s+on|not\s+with|without|only\s+on|only\s+with|only)\s+(?P<name>{0})\b|\b(?P<trailing>{0})\s+only\b",
            alternation
        );
        let scope_phrase = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "Could not build platform scope pattern; using both platforms");
                return Self::default();
            }
        };

        let text = question.to_lowercase();
        let mut scope = Self::default();
        for caps in scope_phrase.captures_iter(&text) {
            let (name, exclusive) = match (caps.name("name"), caps.name("trailing")) {
                (Some(name), _) => (
                    name.as_str(),
                    caps.name("cue").is_some_and(|c| c.as_str().starts_with("only")),
                ),
                (None, Some(name)) => (name.as_str(), true),
                (None, None) => continue,
            };
            let platform = if normalize_name(name) == workbook {
                Platform::Workbook
            } else {
                Platform::Semantic
            };
            match (platform, exclusive) {
                (Platform::Workbook, false) | (Platform::Semantic, true) => scope.include_workbook = false,
                (Platform::Semantic, false) | (Platform::Workbook, true) => scope.include_semantic = false,
            }
        }
        scope
    }

    pub fn includes(&self, platform: Platform) -> bool {
        match platform {
            Platform::Workbook => self.include_workbook,
            Platform::Semantic => self.include_semantic,
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Offer to rebuild a workbook-platform dashboard on the semantic platform.
/// Acting on it requires explicit confirmation by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOffer {
    pub dashboard_luid: String,
    pub dashboard_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionAudit {
    pub question: String,
    pub candidate_id: String,
    pub platform: Platform,
    pub catalog_size: usize,
    pub selected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub candidate: VisualizationCandidate,
    pub image: Vec<u8>,
    pub commentary: String,
    pub rebuild_offer: Option<RebuildOffer>,
    pub audit: SelectionAudit,
}

pub struct QuestionAnswering {
    workbook: Arc<dyn WorkbookPlatform>,
    semantic: Arc<dyn SemanticPlatform>,
    selection: SelectionEngine,
    commentary: Arc<dyn CommentaryOracle>,
    config: PipelineConfig,
    notifier: Arc<dyn Notifier>,
}

impl QuestionAnswering {
    pub fn new(
        workbook: Arc<dyn WorkbookPlatform>,
        semantic: Arc<dyn SemanticPlatform>,
        ranking: Arc<dyn RankingOracle>,
        commentary: Arc<dyn CommentaryOracle>,
        config: PipelineConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            workbook,
            semantic,
            selection: SelectionEngine::new(ranking),
            commentary,
            config,
            notifier,
        }
    }

    pub async fn answer(&self, question: &str) -> BridgeResult<Answer> {
        let scope = PlatformScope::from_question(question, &self.config);
        info!(?scope, "Answering question");

        let workbook_catalog = WorkbookCatalog::new(self.workbook.clone());
        let semantic_catalog = SemanticCatalog::new(self.semantic.clone());
        let mut sources: Vec<&dyn CatalogSource> = Vec::new();
        if scope.include_workbook {
            sources.push(&workbook_catalog);
        }
        if scope.include_semantic {
            sources.push(&semantic_catalog);
        }

        let catalog = build_catalog(&sources, self.notifier.as_ref()).await?;

        self.notifier
            .notify(Notice::status(format!(
                "Looking for the best of {} visualizations...",
                catalog.len()
            )))
            .await;
        let id = self.selection.select(question, &catalog).await?;
        let candidate = catalog
            .get(&id)
            .cloned()
            .ok_or_else(|| BridgeError::Validation(format!("unknown visualization '{}'", id)))?;
        self.notifier
            .notify(Notice::status(format!(
                "Using \"{}\" from {}.",
                candidate.label, candidate.source_platform
            )))
            .await;

        let image = self.fetch_image(&candidate.asset).await?;
        let commentary = self
            .commentary
            .comment(&image, &commentary_prompt(question))
            .await?;

        let rebuild_offer = (candidate.source_platform == Platform::Workbook).then(|| RebuildOffer {
            dashboard_luid: candidate.id.clone(),
            dashboard_name: candidate.label.clone(),
        });

        let audit = SelectionAudit {
            question: question.to_string(),
            candidate_id: candidate.id.clone(),
            platform: candidate.source_platform,
            catalog_size: catalog.len(),
            selected_at: Utc::now(),
        };

        Ok(Answer {
            candidate,
            image,
            commentary,
            rebuild_offer,
            audit,
        })
    }

    async fn fetch_image(&self, asset: &Asset) -> BridgeResult<Vec<u8>> {
        let image = match asset {
            Asset::View { luid } => self.workbook.view_image(luid).await?,
            Asset::Dashboard { .. } | Asset::Metric { .. } => {
                self.semantic.download_image(asset).await?
            }
        };
        if image.is_empty() {
            warn!(asset = asset.id(), "Downloaded image is empty");
        }
        Ok(image)
    }

    /// Accept a rebuild offer. Callers only get here after the user confirmed.
    pub async fn rebuild(&self, offer: &RebuildOffer) -> Result<RebuildOutcome, RebuildError> {
        RebuildOrchestrator::new(
            self.workbook.clone(),
            self.semantic.clone(),
            self.config.clone(),
            self.notifier.clone(),
        )
        .rebuild(&offer.dashboard_luid)
        .await
    }
}
