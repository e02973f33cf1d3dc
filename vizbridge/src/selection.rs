//! Selection engine: asks the ranking oracle which candidate answers a
//! question and validates the answer against the catalog.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{BridgeError, BridgeResult};
use crate::oracle::{RankingOracle, RankingResponse};

pub struct SelectionEngine {
    oracle: Arc<dyn RankingOracle>,
}

impl SelectionEngine {
    pub fn new(oracle: Arc<dyn RankingOracle>) -> Self {
        Self { oracle }
    }

    /// Return the id of the candidate best suited to the question.
    ///
    /// Fails with `Validation` when the oracle answers without a usable id or
    /// names an id that is not in the catalog.
    pub async fn select(&self, question: &str, catalog: &Catalog) -> BridgeResult<String> {
        if catalog.is_empty() {
            return Err(BridgeError::NotFound("no visualizations to choose from".into()));
        }

        let response = self.oracle.rank(question, catalog.candidates()).await?;
        let id = validate_id(&response)?;

        if !catalog.contains(&id) {
            warn!(id = %id, "Ranking oracle chose an id outside the catalog");
            return Err(BridgeError::Validation(format!(
                "the selected visualization '{}' is not one of the candidates",
                id
            )));
        }

        info!(id = %id, "Selected visualization");
        Ok(id)
    }
}

/// Extract a non-empty id. Numbers are accepted and rendered as text.
pub fn validate_id(response: &RankingResponse) -> BridgeResult<String> {
    let id = match &response.id {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => {
            return Err(BridgeError::Validation(
                "the ranking answer did not contain an id".into(),
            ))
        }
        Some(other) => {
            return Err(BridgeError::Validation(format!(
                "the ranking answer id has an unexpected shape: {}",
                other
            )))
        }
    };

    if id.is_empty() || id == "null" {
        return Err(BridgeError::Validation(
            "the ranking answer contained an empty id".into(),
        ));
    }
    Ok(id)
}
