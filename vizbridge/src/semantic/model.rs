//! Semantic model contents and the field resolver that maps workbook field
//! names onto them.

use serde::{Deserialize, Serialize};

/// Entry in the semantic model listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticModelSummary {
    pub api_name: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayCategory {
    Discrete,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldRole {
    Dimension,
    Measure,
}

/// A field as it appears in a data object's dimension or measurement list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFieldRecord {
    pub api_name: String,
    #[serde(default)]
    pub data_object_field_name: String,
    pub display_category: DisplayCategory,
    #[serde(default)]
    pub id: String,
}

/// A field with its role decided from the list it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticField {
    pub api_name: String,
    pub data_object_field_name: String,
    pub display_category: DisplayCategory,
    pub role: FieldRole,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticDataObject {
    #[serde(default)]
    pub id: String,
    pub api_name: String,
    #[serde(default)]
    pub semantic_dimensions: Vec<SemanticFieldRecord>,
    #[serde(default)]
    pub semantic_measurements: Vec<SemanticFieldRecord>,
}

impl SemanticDataObject {
    /// Dimensions followed by measurements.
    ///
    /// A field is a dimension when its id appears among the dimensions, so a
    /// record listed in both places is reported as a dimension each time.
    pub fn fields(&self) -> Vec<SemanticField> {
        let is_dimension = |record: &SemanticFieldRecord| {
            self.semantic_dimensions
                .iter()
                .any(|d| !record.id.is_empty() && d.id == record.id)
        };

        self.semantic_dimensions
            .iter()
            .map(|r| (r, FieldRole::Dimension))
            .chain(self.semantic_measurements.iter().map(|r| {
                let role = if is_dimension(r) {
                    FieldRole::Dimension
                } else {
                    FieldRole::Measure
                };
                (r, role)
            }))
            .map(|(record, role)| SemanticField {
                api_name: record.api_name.clone(),
                data_object_field_name: record.data_object_field_name.clone(),
                display_category: record.display_category,
                role,
                id: record.id.clone(),
            })
            .collect()
    }
}

/// Full semantic model contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticModel {
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub semantic_data_objects: Vec<SemanticDataObject>,
}

impl SemanticModel {
    pub fn primary_data_object(&self) -> Option<&SemanticDataObject> {
        self.semantic_data_objects.first()
    }
}

/// Map a workbook field name onto a semantic field.
///
/// Tries a case-insensitive exact match on `api_name` first, then a
/// case-insensitive prefix match against `data_object_field_name`, which
/// absorbs generated numeric suffixes (`Sales` → `Sales2__c`). The first hit
/// of each rule wins; `None` means the field is unresolved.
pub fn resolve<'a>(field_name: &str, fields: &'a [SemanticField]) -> Option<&'a SemanticField> {
    let wanted = field_name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    fields
        .iter()
        .find(|f| f.api_name.to_lowercase() == wanted)
        .or_else(|| {
            fields
                .iter()
                .find(|f| f.data_object_field_name.to_lowercase().starts_with(&wanted))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_object() -> SemanticDataObject {
        serde_json::from_value(json!({
            "id": "0Sx1",
            "apiName": "Superstore_Orders",
            "semanticDimensions": [
                { "apiName": "Region", "dataObjectFieldName": "Region__c", "displayCategory": "Discrete", "id": "d1" },
                { "apiName": "Category3", "dataObjectFieldName": "Category__c", "displayCategory": "Discrete", "id": "d2" }
            ],
            "semanticMeasurements": [
                { "apiName": "Sales", "dataObjectFieldName": "Sales__c", "displayCategory": "Continuous", "id": "m1" },
                { "apiName": "Profit_Ratio7", "dataObjectFieldName": "Profit_Ratio__c", "displayCategory": "Continuous", "id": "m2" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_fields_carry_roles() {
        let fields = data_object().fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].role, FieldRole::Dimension);
        assert_eq!(fields[2].role, FieldRole::Measure);
        assert_eq!(fields[2].display_category, DisplayCategory::Continuous);
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let fields = data_object().fields();
        assert_eq!(resolve("region", &fields).map(|f| f.id.as_str()), Some("d1"));
        assert_eq!(resolve("SALES", &fields).map(|f| f.id.as_str()), Some("m1"));
    }

    #[test]
    fn test_prefix_match_absorbs_suffix_drift() {
        let fields = data_object().fields();
        assert_eq!(
            resolve("Category", &fields).map(|f| f.api_name.as_str()),
            Some("Category3")
        );
        assert_eq!(
            resolve("Profit_Ratio", &fields).map(|f| f.api_name.as_str()),
            Some("Profit_Ratio7")
        );
    }

    #[test]
    fn test_unresolved_and_idempotent() {
        let fields = data_object().fields();
        assert!(resolve("Discount", &fields).is_none());
        assert!(resolve("", &fields).is_none());
        assert_eq!(resolve("Category", &fields), resolve("Category", &fields));
    }
}
