//! Registry operations, one struct per concern
//!
//! [`AuthOperations`] owns credential negotiation and is shared by the blob and manifest
//! operations, which route every request through [`AuthOperations::do_request`].

pub mod auth_operations;
pub mod blob_operations;
pub mod manifest_operations;

pub use auth_operations::{AuthOperations, AuthorizedResponse, OciAccess};
pub use blob_operations::{BlobOperations, UploadSession};
pub use manifest_operations::{ManifestOperations, ManifestResponse};
