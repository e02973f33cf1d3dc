//! Visual Spec Builder: turns one workbook worksheet into a semantic-platform
//! visualization draft.
//!
//! The builder owns the draft and the field-key counter. The four stages run
//! in a fixed order (shelves, marks, filters, other properties) because later
//! stages read fields placed by earlier ones and every new key comes from the
//! same counter. Problems with individual fields degrade that field only and
//! are reported as [`BuildWarning`]s.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::field_ref::{self, FieldReference};
use crate::semantic::model::{resolve, DisplayCategory, SemanticDataObject, SemanticField};
use crate::visual::document::{
    AxisStyle, EncodingType, FieldDefinition, FieldKey, FilterDefinition, HeaderStyle,
    MarkEncoding, PaneStyle, ReferenceKind, SortOrder, SortSpec, VisualSpecDraft,
    DEFAULT_MARK_TYPE,
};
use crate::workbook::document::{Shelf, Worksheet, XmlElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    RowsColumns,
    Marks,
    Filters,
    OtherProperties,
}

/// A non-fatal problem met while building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildWarning {
    pub stage: BuildStage,
    pub message: String,
}

/// Result of a complete build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub draft: VisualSpecDraft,
    /// Last key number handed out.
    pub field_counter: u32,
    pub warnings: Vec<BuildWarning>,
}

pub struct VisualSpecBuilder<'a> {
    data_object: &'a SemanticDataObject,
    semantic_fields: Vec<SemanticField>,
    draft: VisualSpecDraft,
    counter: u32,
    warnings: Vec<BuildWarning>,
}

impl<'a> VisualSpecBuilder<'a> {
    pub fn new(data_object: &'a SemanticDataObject) -> Self {
        Self {
            data_object,
            semantic_fields: data_object.fields(),
            draft: VisualSpecDraft::new(&data_object.id, &data_object.api_name),
            counter: 0,
            warnings: Vec::new(),
        }
    }

    /// Run all four stages in order.
    pub fn build(mut self, worksheet: &Worksheet<'_>) -> BuildOutput {
        debug!(worksheet = worksheet.name(), "Building visualization from worksheet");
        self.process_shelf(worksheet, Shelf::Rows);
        self.process_shelf(worksheet, Shelf::Columns);
        self.process_marks(worksheet);
        self.process_filters(worksheet);
        self.process_other(worksheet);
        self.finish()
    }

    pub fn finish(self) -> BuildOutput {
        let dangling = self.draft.dangling_keys();
        if !dangling.is_empty() {
            error!(?dangling, "Draft references field keys with no definition");
        }
        BuildOutput {
            draft: self.draft,
            field_counter: self.counter,
            warnings: self.warnings,
        }
    }

    fn next_key(&mut self) -> FieldKey {
        self.counter += 1;
        FieldKey::numbered(self.counter)
    }

    fn warn(&mut self, stage: BuildStage, message: String) {
        warn!(stage = ?stage, "{}", message);
        self.warnings.push(BuildWarning { stage, message });
    }

    /// Definition for one usage of a decoded reference. Unresolved fields keep
    /// a `None` field name.
    fn definition_for(&mut self, stage: BuildStage, reference: &FieldReference) -> FieldDefinition {
        let resolved = reference
            .field_name
            .as_deref()
            .and_then(|name| resolve(name, &self.semantic_fields))
            .cloned();

        if resolved.is_none() {
            self.warn(
                stage,
                format!(
                    "Field {} has no match in semantic data object '{}'",
                    reference, self.data_object.api_name
                ),
            );
        }

        FieldDefinition {
            display_category: resolved.as_ref().map(|f| f.display_category),
            field_name: resolved.as_ref().map(|f| f.api_name.clone()),
            function: reference.aggregation_function().map(str::to_string),
            object_name: self.data_object.api_name.clone(),
            role: resolved.as_ref().map(|f| f.role),
            kind: ReferenceKind::Field,
        }
    }

    fn insert_field(&mut self, definition: FieldDefinition) -> FieldKey {
        let key = self.next_key();
        self.draft.fields.insert(key.clone(), definition);
        key
    }

    fn add_pane_style(&mut self, key: &FieldKey, definition: &FieldDefinition) {
        if definition.is_measure() {
            self.draft
                .visual_specification
                .style
                .panes
                .insert(key.clone(), PaneStyle::default());
        }
    }

    /// Rows/columns stage for one shelf.
    pub fn process_shelf(&mut self, worksheet: &Worksheet<'_>, shelf: Shelf) {
        let Some(text) = worksheet.shelf_text(shelf) else {
            debug!(shelf = shelf.tag(), "Shelf is empty");
            return;
        };

        for raw in field_ref::split_shelf(text) {
            let reference = field_ref::parse(raw);
            let sort = worksheet.computed_sort(raw);

            let definition = self.definition_for(BuildStage::RowsColumns, &reference);
            let key = self.insert_field(definition.clone());

            let spec = &mut self.draft.visual_specification;
            match shelf {
                Shelf::Rows => spec.rows.push(key.clone()),
                Shelf::Columns => spec.columns.push(key.clone()),
            }
            match definition.display_category {
                Some(DisplayCategory::Discrete) => {
                    spec.style.headers.insert(key.clone(), HeaderStyle::default());
                }
                Some(DisplayCategory::Continuous) => {
                    spec.style.axis.insert(key.clone(), AxisStyle::default());
                }
                None => {}
            }
            self.add_pane_style(&key, &definition);

            if let Some(sort) = sort {
                let using = field_ref::parse(&sort.using);
                let sort_definition = self.definition_for(BuildStage::RowsColumns, &using);
                let sort_key = self.insert_field(sort_definition);
                let order = if sort.is_descending() {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                self.draft.view.view_specification.sort_orders.fields.insert(
                    key,
                    SortSpec {
                        by_field: sort_key,
                        order,
                        kind: ReferenceKind::Field,
                    },
                );
            }
        }
    }

    /// Marks stage: mark type, static or field-encoded color, labels.
    pub fn process_marks(&mut self, worksheet: &Worksheet<'_>) {
        let mark_type = match worksheet.mark_class() {
            None | Some("Automatic") => DEFAULT_MARK_TYPE,
            Some(class) => class,
        };
        self.draft.visual_specification.marks.all.mark_type = mark_type.to_string();

        let mut color_definition = None;
        match worksheet.mark_format("mark-color").filter(|c| !c.is_empty()) {
            Some(color) => {
                self.draft.visual_specification.style.marks.all.color.color = color.to_string();
            }
            None => {
                if let Some(column) = worksheet.pane_encoding("color") {
                    let reference = field_ref::parse(column);
                    if reference.is_resolved() {
                        let definition = self.definition_for(BuildStage::Marks, &reference);
                        let key = self.insert_field(definition.clone());
                        self.draft
                            .visual_specification
                            .marks
                            .all
                            .encodings
                            .push(MarkEncoding {
                                field_key: key.clone(),
                                encoding_type: EncodingType::Color,
                            });
                        self.add_pane_style(&key, &definition);
                        color_definition = Some(definition);
                    } else {
                        self.warn(
                            BuildStage::Marks,
                            format!("Color encoding '{}' is not a field reference", column),
                        );
                    }
                }
            }
        }

        let show_labels = worksheet
            .mark_format("mark-labels-show")
            .map(is_truthy)
            .unwrap_or(false);
        let cull_labels = worksheet
            .mark_format("mark-labels-cull")
            .map(is_truthy)
            .unwrap_or(false);

        let label_style = &mut self.draft.visual_specification.style.marks.all.label;
        if show_labels {
            label_style.show_mark_labels = true;
        }
        if cull_labels {
            label_style.can_overlap_labels = true;
        }

        // Each encoding needs its own key, so labels get a copy of the color field.
        if let (true, Some(definition)) = (show_labels, color_definition) {
            let key = self.insert_field(definition.clone());
            self.draft
                .visual_specification
                .marks
                .all
                .encodings
                .push(MarkEncoding {
                    field_key: key.clone(),
                    encoding_type: EncodingType::Label,
                });
            self.add_pane_style(&key, &definition);
        }
    }

    /// Filters stage. Only categorical selection filters are carried over.
    pub fn process_filters(&mut self, worksheet: &Worksheet<'_>) {
        for filter in worksheet.filters() {
            let class = filter.attr("class").unwrap_or_default();
            let column = filter.attr("column").unwrap_or_default();

            if class != "categorical" {
                self.warn(
                    BuildStage::Filters,
                    format!(
                        "Skipping filter of class '{}' on column '{}': not supported",
                        class, column
                    ),
                );
                continue;
            }

            let reference = field_ref::parse(column);
            if !reference.is_resolved() {
                self.warn(
                    BuildStage::Filters,
                    format!("Skipping filter on '{}': not a field reference", column),
                );
                continue;
            }

            let values = selected_members(filter);
            let is_excludes = enumeration_mode(filter) != "inclusive";
            if values.is_empty() && !is_excludes {
                // an inclusive filter with nothing selected would hide every row
                self.warn(
                    BuildStage::Filters,
                    format!("Skipping filter on '{}': no members are selected", column),
                );
                continue;
            }

            let definition = self.definition_for(BuildStage::Filters, &reference);
            let key = self.insert_field(definition);
            debug!(field = %key, ?values, is_excludes, "Categorical filter");

            self.draft
                .view
                .view_specification
                .filters
                .push(FilterDefinition::categorical(key, is_excludes, values));
        }
    }

    /// Other-properties stage: view fit from the worksheet window's zoom.
    pub fn process_other(&mut self, worksheet: &Worksheet<'_>) {
        let Some(zoom) = worksheet.zoom_type() else {
            return;
        };
        match fit_for_zoom(zoom) {
            Some(fit) => self.draft.visual_specification.style.fit = fit.to_string(),
            None => self.warn(
                BuildStage::OtherProperties,
                format!("Unknown zoom type '{}', keeping default fit", zoom),
            ),
        }
    }
}

/// Build a draft from a worksheet against one semantic data object.
pub fn build_visual_spec(worksheet: &Worksheet<'_>, data_object: &SemanticDataObject) -> BuildOutput {
    VisualSpecBuilder::new(data_object).build(worksheet)
}

fn fit_for_zoom(zoom: &str) -> Option<&'static str> {
    match zoom {
        "entire-view" => Some("Entire"),
        "fit-width" => Some("Width"),
        "fit-height" => Some("Height"),
        "normal" => Some("Normal"),
        _ => None,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Selected members: a lone `member` predicate, or every `member` predicate
/// under a union.
fn selected_members(filter: &XmlElement) -> Vec<String> {
    filter
        .find_all("groupfilter")
        .into_iter()
        .filter(|g| g.attr("function") == Some("member"))
        .filter_map(|g| g.attr("member"))
        .map(clean_member)
        .collect()
}

fn clean_member(member: &str) -> String {
    member.replace("&quot;", "").replace('"', "")
}

fn enumeration_mode(filter: &XmlElement) -> &str {
    const KEY: &str = "user:ui-enumeration";
    filter
        .attr(KEY)
        .or_else(|| {
            filter
                .find_all("groupfilter")
                .into_iter()
                .find_map(|g| g.attr(KEY))
        })
        .unwrap_or("inclusive")
}
