//! The semantic platform's visualization document.
//!
//! [`VisualSpecDraft`] serializes to exactly the JSON the visualization
//! endpoint accepts. Fields are addressed through synthetic [`FieldKey`]s
//! (`F1`, `F2`, ...) that every other section refers back to.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::semantic::model::{DisplayCategory, FieldRole};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    pub fn numbered(n: u32) -> Self {
        FieldKey(format!("F{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The constant `"type": "Field"` tag used on field-like entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferenceKind {
    #[default]
    Field,
}

/// One usage of a semantic field inside the visualization.
///
/// `field_name` is `None` when the workbook field could not be resolved; the
/// entry still exists so every key reference stays valid, and submission
/// rejects it visibly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub display_category: Option<DisplayCategory>,
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub object_name: String,
    pub role: Option<FieldRole>,
    #[serde(rename = "type", default)]
    pub kind: ReferenceKind,
}

impl FieldDefinition {
    pub fn is_resolved(&self) -> bool {
        self.field_name.is_some()
    }

    pub fn is_measure(&self) -> bool {
        self.role == Some(FieldRole::Measure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub by_field: FieldKey,
    pub order: SortOrder,
    #[serde(rename = "type", default)]
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterInfo {
    pub is_custom: bool,
    pub is_excludes: bool,
    #[serde(rename = "type")]
    pub filter_type: String,
    pub use_all: bool,
    pub values: Vec<String>,
}

/// A categorical selection filter on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    pub field_key: FieldKey,
    pub filter_infos: Vec<FilterInfo>,
    pub is_context: bool,
}

impl FilterDefinition {
    pub fn categorical(field_key: FieldKey, is_excludes: bool, values: Vec<String>) -> Self {
        Self {
            field_key,
            filter_infos: vec![FilterInfo {
                is_custom: false,
                is_excludes,
                filter_type: "In".to_string(),
                use_all: false,
                values,
            }],
            is_context: false,
        }
    }

    pub fn is_excludes(&self) -> bool {
        self.filter_infos.iter().any(|i| i.is_excludes)
    }

    pub fn selected_values(&self) -> Vec<&str> {
        self.filter_infos
            .iter()
            .flat_map(|i| i.values.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingType {
    Color,
    Label,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEncoding {
    pub field_key: FieldKey,
    #[serde(rename = "type")]
    pub encoding_type: EncodingType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrders {
    pub columns: Vec<Value>,
    pub fields: IndexMap<FieldKey, SortSpec>,
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpecification {
    pub filters: Vec<FilterDefinition>,
    pub sort_orders: SortOrders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    pub label: String,
    pub name: String,
    pub view_specification: ViewSpecification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub is_automatic: bool,
    pub is_stacked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSpec {
    pub encodings: Vec<MarkEncoding>,
    pub is_automatic: bool,
    pub stack: Stack,
    #[serde(rename = "type")]
    pub mark_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marks {
    #[serde(rename = "ALL")]
    pub all: MarkSpec,
}

// Style sections

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFormatInfo {
    pub decimal_places: u32,
    pub display_units: String,
    pub include_thousand_separator: bool,
    pub negative_values_format: String,
    pub prefix: String,
    pub suffix: String,
    #[serde(rename = "type")]
    pub format_type: String,
}

impl NumberFormatInfo {
    fn with_type(format_type: &str) -> Self {
        Self {
            decimal_places: 2,
            display_units: "Auto".to_string(),
            include_thousand_separator: true,
            negative_values_format: "Auto".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            format_type: format_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFormat {
    pub number_format_info: NumberFormatInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderStyle {
    pub hidden_values: Vec<Value>,
    pub is_visible: bool,
    pub show_missing_values: bool,
}

impl Default for HeaderStyle {
    fn default() -> Self {
        Self {
            hidden_values: Vec::new(),
            is_visible: true,
            show_missing_values: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisRange {
    pub include_zero: bool,
    #[serde(rename = "type")]
    pub range_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisScale {
    pub format: NumberFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSpec {
    #[serde(rename = "type")]
    pub tick_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisTicks {
    pub major_ticks: TickSpec,
    pub minor_ticks: TickSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisStyle {
    pub is_visible: bool,
    pub range: AxisRange,
    pub scale: AxisScale,
    pub ticks: AxisTicks,
}

impl Default for AxisStyle {
    fn default() -> Self {
        let auto = || TickSpec {
            tick_type: "Auto".to_string(),
        };
        Self {
            is_visible: true,
            range: AxisRange {
                include_zero: true,
                range_type: "Auto".to_string(),
            },
            scale: AxisScale {
                format: NumberFormat {
                    number_format_info: NumberFormatInfo::with_type("NumberShort"),
                },
            },
            ticks: AxisTicks {
                major_ticks: auto(),
                minor_ticks: auto(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneDefaults {
    pub format: NumberFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneStyle {
    pub defaults: PaneDefaults,
}

impl Default for PaneStyle {
    fn default() -> Self {
        Self {
            defaults: PaneDefaults {
                format: NumberFormat {
                    number_format_info: NumberFormatInfo::with_type("Number"),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowLabels {
    pub show_labels: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLabels {
    pub columns: ShowLabels,
    pub rows: ShowLabels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStyle {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarksToLabel {
    #[serde(rename = "type")]
    pub label_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelStyle {
    pub can_overlap_labels: bool,
    pub marks_to_label: MarksToLabel,
    pub show_mark_labels: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeStyle {
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkStyle {
    pub color: ColorStyle,
    pub label: LabelStyle,
    pub range: RangeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkStyles {
    #[serde(rename = "ALL")]
    pub all: MarkStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleStyle {
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub axis: IndexMap<FieldKey, AxisStyle>,
    pub field_labels: FieldLabels,
    pub fit: String,
    pub headers: IndexMap<FieldKey, HeaderStyle>,
    pub marks: MarkStyles,
    pub panes: IndexMap<FieldKey, PaneStyle>,
    pub reference_lines: Map<String, Value>,
    pub show_data_placeholder: bool,
    pub title: TitleStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualSpecification {
    pub columns: Vec<FieldKey>,
    pub rows: Vec<FieldKey>,
    pub forecasts: Map<String, Value>,
    pub legends: Map<String, Value>,
    pub marks: Marks,
    pub measure_values: Vec<Value>,
    pub mode: String,
    pub reference_lines: Map<String, Value>,
    pub style: Style,
}

/// The in-progress (and finally submitted) visualization document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualSpecDraft {
    pub data_source: DataSourceRef,
    pub fields: IndexMap<FieldKey, FieldDefinition>,
    pub interactions: Vec<Value>,
    pub label: String,
    pub name: String,
    pub view: ViewDefinition,
    pub visual_specification: VisualSpecification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceRef>,
}

pub const DEFAULT_MARK_TYPE: &str = "Bar";
pub const DEFAULT_FIT: &str = "Standard";

impl VisualSpecDraft {
    /// An empty visualization bound to one semantic data object.
    pub fn new(data_object_id: &str, data_object_api_name: &str) -> Self {
        Self {
            data_source: DataSourceRef {
                id: data_object_id.to_string(),
                name: data_object_api_name.to_string(),
                source_type: "SemanticModel".to_string(),
            },
            fields: IndexMap::new(),
            interactions: Vec::new(),
            label: String::new(),
            name: String::new(),
            view: ViewDefinition {
                label: String::new(),
                name: String::new(),
                view_specification: ViewSpecification {
                    filters: Vec::new(),
                    sort_orders: SortOrders {
                        columns: Vec::new(),
                        fields: IndexMap::new(),
                        rows: Vec::new(),
                    },
                },
            },
            visual_specification: VisualSpecification {
                columns: Vec::new(),
                rows: Vec::new(),
                forecasts: Map::new(),
                legends: Map::new(),
                marks: Marks {
                    all: MarkSpec {
                        encodings: Vec::new(),
                        is_automatic: true,
                        stack: Stack {
                            is_automatic: true,
                            is_stacked: true,
                        },
                        mark_type: DEFAULT_MARK_TYPE.to_string(),
                    },
                },
                measure_values: Vec::new(),
                mode: "Visualization".to_string(),
                reference_lines: Map::new(),
                style: Style {
                    axis: IndexMap::new(),
                    field_labels: FieldLabels {
                        columns: ShowLabels { show_labels: true },
                        rows: ShowLabels { show_labels: true },
                    },
                    fit: DEFAULT_FIT.to_string(),
                    headers: IndexMap::new(),
                    marks: MarkStyles {
                        all: MarkStyle {
                            color: ColorStyle {
                                color: String::new(),
                            },
                            label: LabelStyle {
                                can_overlap_labels: false,
                                marks_to_label: MarksToLabel {
                                    label_type: "All".to_string(),
                                },
                                show_mark_labels: false,
                            },
                            range: RangeStyle { reverse: true },
                        },
                    },
                    panes: IndexMap::new(),
                    reference_lines: Map::new(),
                    show_data_placeholder: false,
                    title: TitleStyle { is_visible: true },
                },
            },
            workspace: None,
        }
    }

    /// Set the label on the visualization and its view, and derive the API
    /// name from it.
    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
        self.view.label = label.to_string();
        self.name = api_name_for_label(label);
    }

    /// Every field key referenced outside the `fields` map.
    pub fn referenced_keys(&self) -> BTreeSet<&FieldKey> {
        let spec = &self.visual_specification;
        let view = &self.view.view_specification;

        spec.rows
            .iter()
            .chain(spec.columns.iter())
            .chain(spec.marks.all.encodings.iter().map(|e| &e.field_key))
            .chain(view.filters.iter().map(|f| &f.field_key))
            .chain(view.sort_orders.fields.keys())
            .chain(view.sort_orders.fields.values().map(|s| &s.by_field))
            .chain(spec.style.headers.keys())
            .chain(spec.style.axis.keys())
            .chain(spec.style.panes.keys())
            .collect()
    }

    /// Referenced keys with no entry in `fields`. Empty for a consistent draft.
    pub fn dangling_keys(&self) -> Vec<FieldKey> {
        self.referenced_keys()
            .into_iter()
            .filter(|k| !self.fields.contains_key(*k))
            .cloned()
            .collect()
    }

    pub fn unresolved_keys(&self) -> Vec<&FieldKey> {
        self.fields
            .iter()
            .filter(|(_, def)| !def.is_resolved())
            .map(|(k, _)| k)
            .collect()
    }
}

/// `"Sales Overview [Rebuilt]"` → `"sales_overview_rebuilt"`.
pub fn api_name_for_label(label: &str) -> String {
    label
        .replace(' ', "_")
        .replace(['[', ']'], "")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_draft_shape() {
        let draft = VisualSpecDraft::new("0Sx1", "Orders");
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(
            value["dataSource"],
            json!({ "id": "0Sx1", "name": "Orders", "type": "SemanticModel" })
        );
        assert_eq!(value["visualSpecification"]["marks"]["ALL"]["type"], "Bar");
        assert_eq!(value["visualSpecification"]["style"]["fit"], "Standard");
        assert_eq!(
            value["visualSpecification"]["style"]["marks"]["ALL"]["label"]["marksToLabel"],
            json!({ "type": "All" })
        );
        assert_eq!(
            value["view"]["viewSpecification"]["sortOrders"],
            json!({ "columns": [], "fields": {}, "rows": [] })
        );
        assert!(value.get("workspace").is_none());
    }

    #[test]
    fn test_style_templates() {
        let axis = serde_json::to_value(AxisStyle::default()).unwrap();
        assert_eq!(
            axis["scale"]["format"]["numberFormatInfo"]["type"],
            "NumberShort"
        );
        assert_eq!(axis["ticks"]["minorTicks"], json!({ "type": "Auto" }));

        let pane = serde_json::to_value(PaneStyle::default()).unwrap();
        assert_eq!(pane["defaults"]["format"]["numberFormatInfo"]["type"], "Number");

        let header = serde_json::to_value(HeaderStyle::default()).unwrap();
        assert_eq!(
            header,
            json!({ "hiddenValues": [], "isVisible": true, "showMissingValues": false })
        );
    }

    #[test]
    fn test_unresolved_definition_serializes_null_name() {
        let def = FieldDefinition {
            display_category: None,
            field_name: None,
            function: None,
            object_name: "Orders".into(),
            role: None,
            kind: ReferenceKind::Field,
        };
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["fieldName"], Value::Null);
        assert!(value.get("function").is_none());
        assert_eq!(value["type"], "Field");
    }

    #[test]
    fn test_dangling_keys() {
        let mut draft = VisualSpecDraft::new("id", "Orders");
        draft.visual_specification.rows.push(FieldKey::numbered(1));
        assert_eq!(draft.dangling_keys(), vec![FieldKey::numbered(1)]);
    }

    #[test]
    fn test_label_and_api_name() {
        let mut draft = VisualSpecDraft::new("id", "Orders");
        draft.set_label("Sales Overview [Rebuilt]");
        assert_eq!(draft.view.label, "Sales Overview [Rebuilt]");
        assert_eq!(draft.name, "sales_overview_rebuilt");
    }
}
