//! Candidate catalog: the normalized list of charts from both platforms that
//! the selection step ranks.

pub mod semantic;
pub mod workbook;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::candidate::{Platform, VisualizationCandidate};
use crate::error::{BridgeError, BridgeResult};
use crate::notify::{Notice, Notifier};

pub use semantic::SemanticCatalog;
pub use workbook::WorkbookCatalog;

/// One platform's contribution to the catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Read-only: lists candidates without changing anything on the platform.
    async fn build(&self) -> BridgeResult<Vec<VisualizationCandidate>>;
}

/// A platform that was left out of the catalog and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledPlatform {
    pub platform: Platform,
    pub reason: String,
}

/// The combined catalog for one question.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    candidates: Vec<VisualizationCandidate>,
    disabled: Vec<DisabledPlatform>,
}

impl Catalog {
    pub fn candidates(&self) -> &[VisualizationCandidate] {
        &self.candidates
    }

    pub fn get(&self, id: &str) -> Option<&VisualizationCandidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Build every source concurrently and merge the results.
///
/// A failing source is dropped from the catalog and reported through the
/// notifier; the request only fails when no source succeeded. Duplicate ids
/// keep their first occurrence.
pub async fn build_catalog(
    sources: &[&dyn CatalogSource],
    notifier: &dyn Notifier,
) -> BridgeResult<Catalog> {
    if sources.is_empty() {
        return Err(BridgeError::NotFound(
            "no visualization platform is in scope for this question".into(),
        ));
    }

    let results = join_all(sources.iter().map(|source| async move {
        (source.platform(), source.build().await)
    }))
    .await;

    let mut catalog = Catalog::default();
    let mut seen = HashSet::new();
    let mut first_error = None;

    for (platform, result) in results {
        match result {
            Ok(candidates) => {
                info!(platform = ?platform, count = candidates.len(), "Catalog source built");
                notifier
                    .notify(Notice::status(format!(
                        "Found {} visualizations for review on {}.",
                        candidates.len(),
                        platform
                    )))
                    .await;
                for candidate in candidates {
                    if seen.insert(candidate.id.clone()) {
                        catalog.candidates.push(candidate);
                    } else {
                        warn!(id = %candidate.id, "Duplicate candidate id; keeping the first");
                    }
                }
            }
            Err(err) => {
                warn!(platform = ?platform, error = %err, "Catalog source failed; continuing without it");
                notifier.notify(Notice::warning(err.user_message())).await;
                catalog.disabled.push(DisabledPlatform {
                    platform,
                    reason: err.to_string(),
                });
                first_error.get_or_insert(err);
            }
        }
    }

    if catalog.disabled.len() == sources.len() {
        if let Some(err) = first_error {
            return Err(err);
        }
    }
    if catalog.is_empty() {
        return Err(BridgeError::NotFound("no visualizations to choose from".into()));
    }

    Ok(catalog)
}
