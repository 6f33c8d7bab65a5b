// file: src/exporter/mod.rs
// description: exporter module exports
// reference: internal module structure

pub mod json;

pub use json::{CaseExport, ExportManifest, JsonExporter};
