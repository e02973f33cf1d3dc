//! Visualization documents for the semantic platform and the builder that
//! produces them from workbook worksheets.

pub mod builder;
pub mod document;

pub use builder::{build_visual_spec, BuildOutput, BuildStage, BuildWarning, VisualSpecBuilder};
pub use document::{FieldDefinition, FieldKey, FilterDefinition, VisualSpecDraft};
