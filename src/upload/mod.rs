//! Upload strategies injected into push operations

pub mod callback;

pub use callback::{ReporterUploadCallback, UploadCallback};
