// vizbridge
// Finds the chart that answers a data question across a workbook platform and
// a semantic platform, and rebuilds workbook charts as semantic visualizations.

pub mod candidate;
pub mod catalog;
pub mod config;
pub mod data_query;
pub mod error;
pub mod field_ref;
pub mod notify;
pub mod oracle;
pub mod question;
pub mod rebuild;
pub mod selection;
pub mod semantic;
pub mod visual;
pub mod workbook;

pub use candidate::{Asset, Platform, VisualizationCandidate};
pub use catalog::{build_catalog, Catalog, CatalogSource};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, RebuildError, RebuildStage};
pub use field_ref::FieldReference;
pub use notify::{LogNotifier, Notice, NoticeLevel, Notifier};
pub use question::{Answer, PlatformScope, QuestionAnswering, RebuildOffer};
pub use rebuild::{RebuildOrchestrator, RebuildOutcome};
pub use selection::SelectionEngine;
pub use visual::{build_visual_spec, VisualSpecDraft};
