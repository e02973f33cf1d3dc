mod common;

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

use common::{superstore_model, WORKBOOK_MARKUP};
use vizbridge::field_ref;
use vizbridge::semantic::model::resolve;
use vizbridge::visual::document::FieldKey;
use vizbridge::visual::{build_visual_spec, BuildOutput};
use vizbridge::workbook::WorkbookDocument;

fn build(markup: &str, sheet: &str) -> BuildOutput {
    let model = superstore_model();
    let document = WorkbookDocument::parse(markup).unwrap();
    let worksheet = document.worksheet(sheet).unwrap();
    build_visual_spec(&worksheet, model.primary_data_object().unwrap())
}

fn single_sheet(table: &str) -> String {
    format!(
        "<workbook><worksheets><worksheet name='Sheet'><table>{}</table></worksheet></worksheets></workbook>",
        table
    )
}

fn variety() -> Vec<String> {
    vec![
        WORKBOOK_MARKUP.to_string(),
        single_sheet("<rows>[ds].[none:Region:nk] / [ds].[none:Category:nk]</rows><cols>[ds].[avg:Profit:qk]</cols>"),
        single_sheet(
            "<view><computed-sort column='[ds].[none:Category:nk]' direction='ASC' using='[ds].[sum:Sales:qk]' />\
             <filter class='categorical' column='[ds].[none:Category:nk]'>\
               <groupfilter function='union' user:ui-enumeration='exclusive'>\
                 <groupfilter function='member' member='&quot;Furniture&quot;' />\
                 <groupfilter function='member' member='&quot;Technology&quot;' />\
               </groupfilter>\
             </filter></view>\
             <rows>[ds].[none:Category:nk]</rows><cols>[ds].[sum:Discount:qk]</cols>",
        ),
        single_sheet("<rows>not a reference</rows><cols></cols>"),
        single_sheet(""),
    ]
}

fn sheet_name(markup: &str) -> &'static str {
    if markup.contains("Sales by Region") {
        "Sales by Region"
    } else {
        "Sheet"
    }
}

#[test]
fn test_every_referenced_key_is_defined() {
    for markup in variety() {
        let out = build(&markup, sheet_name(&markup));
        assert!(
            out.draft.dangling_keys().is_empty(),
            "dangling keys in build of {}",
            markup
        );
    }
}

#[test]
fn test_keys_are_sequential_and_never_reused() {
    for markup in variety() {
        let out = build(&markup, sheet_name(&markup));
        let keys: Vec<&FieldKey> = out.draft.fields.keys().collect();
        let expected: Vec<FieldKey> = (1..=out.field_counter).map(FieldKey::numbered).collect();
        assert_eq!(keys, expected.iter().collect::<Vec<_>>());

        let distinct: BTreeSet<&FieldKey> = keys.iter().copied().collect();
        assert_eq!(distinct.len(), keys.len());
    }
}

#[test]
fn test_round_trip_one_row_one_column() {
    let out = build(
        &single_sheet("<rows>[ds].[none:Region:nk]</rows><cols>[ds].[sum:Sales:qk]</cols>"),
        "Sheet",
    );
    let spec = &out.draft.visual_specification;
    assert_eq!(out.draft.fields.len(), 2);
    assert_eq!(spec.rows.len(), 1);
    assert_eq!(spec.columns.len(), 1);
    assert_eq!(spec.style.headers.keys().collect::<Vec<_>>(), vec![&spec.rows[0]]);
    assert_eq!(spec.style.axis.keys().collect::<Vec<_>>(), vec![&spec.columns[0]]);
    assert_eq!(spec.style.panes.keys().collect::<Vec<_>>(), vec![&spec.columns[0]]);
}

#[test]
fn test_union_filter_with_exclusion() {
    let markup = &variety()[2];
    let out = build(markup, "Sheet");

    let filters = &out.draft.view.view_specification.filters;
    assert_eq!(filters.len(), 1);
    assert!(filters[0].is_excludes());
    assert_eq!(filters[0].selected_values(), vec!["Furniture", "Technology"]);
    // Discount is not in the semantic model
    assert_eq!(out.draft.unresolved_keys().len(), 1);
}

#[test]
fn test_filter_without_selected_members_is_skipped() {
    let out = build(
        &single_sheet(
            "<view>\
               <filter class='categorical' column='[ds].[none:Region:nk]'>\
                 <groupfilter function='level-members' level='[none:Region:nk]' />\
               </filter>\
               <filter class='categorical' column='[ds].[none:Category:nk]' />\
             </view>\
             <rows>[ds].[none:Region:nk]</rows>",
        ),
        "Sheet",
    );

    assert!(out.draft.view.view_specification.filters.is_empty());
    assert_eq!(out.field_counter, 1);
    assert_eq!(out.warnings.len(), 2);
    assert!(out
        .warnings
        .iter()
        .all(|w| w.message.contains("no members are selected")));
}

#[test]
fn test_unparseable_shelf_entry_degrades_only_that_entry() {
    let out = build(&variety()[3], "Sheet");
    assert_eq!(out.field_counter, 1);
    assert_eq!(out.draft.unresolved_keys().len(), 1);
    assert_eq!(out.warnings.len(), 1);
}

#[test]
fn test_scenario_a_reference() {
    let reference = field_ref::parse("[ds].[sum:Sales:qk]");
    assert_eq!(reference.aggregation.as_deref(), Some("sum"));
    assert_eq!(reference.field_name.as_deref(), Some("Sales"));
    assert_eq!(reference.role_category.as_deref(), Some("qk"));
}

#[test]
fn test_parse_is_all_or_nothing() {
    for input in ["", "Sales", "[ds].[sum:Sales]", "[ds].sum:Sales:qk", "[ds].[::]"] {
        let reference = field_ref::parse(input);
        assert_eq!(reference.aggregation, None, "{}", input);
        assert_eq!(reference.field_name, None, "{}", input);
        assert_eq!(reference.role_category, None, "{}", input);
    }
}

#[test]
fn test_resolve_is_idempotent() {
    let model = superstore_model();
    let fields = model.primary_data_object().unwrap().fields();
    for name in ["Sales", "region", "Profit", "Discount", ""] {
        assert_eq!(resolve(name, &fields), resolve(name, &fields));
    }
    assert_eq!(resolve("sales", &fields).map(|f| f.api_name.as_str()), Some("Sales2"));
    assert_eq!(resolve("Discount", &fields), None);
}
