//! Pull and push entry points
//!
//! [`LibraryClient`] tries the OCI registry first and falls back to the library protocol when
//! the service reports that a namespace is not available over OCI:
//!
//! ```text
//! pull: OCI ──ok──────────────────────────────► done
//!        └─ OCI access unsupported ─► legacy ─► redirects (≤10) ─► single | multi stream
//! push: metadata ─► digest ─► OCI (blob, config, manifest) | legacy upload ─► tags
//! ```

pub mod metadata;
pub mod pull;
pub mod push;

pub use metadata::{EntityKind, LibraryPath, MetadataStore};
pub use push::PushRequest;

use crate::concurrency::engine::TransferEngine;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::legacy::LegacyClient;
use crate::logging::Logger;
use crate::registry::RegistryClient;
use std::sync::Arc;

pub struct LibraryClientBuilder {
    config: ClientConfig,
    output: Logger,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl LibraryClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            output: Logger::default(),
            metadata: None,
        }
    }

    pub fn with_output(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    /// Metadata service used by push; pull works without one
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> Result<LibraryClient> {
        self.config.validate()?;
        let registry = RegistryClient::builder(self.config.clone())
            .with_output(self.output.clone())
            .build()?;
        let legacy = LegacyClient::new(self.config.clone(), self.output.clone())?;

        Ok(LibraryClient {
            engine: TransferEngine::new(self.output.clone()),
            config: self.config,
            registry,
            legacy,
            metadata: self.metadata,
            output: self.output,
        })
    }
}

pub struct LibraryClient {
    config: ClientConfig,
    registry: RegistryClient,
    legacy: LegacyClient,
    engine: TransferEngine,
    metadata: Option<Arc<dyn MetadataStore>>,
    output: Logger,
}

impl LibraryClient {
    pub fn builder(config: ClientConfig) -> LibraryClientBuilder {
        LibraryClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    pub fn legacy(&self) -> &LegacyClient {
        &self.legacy
    }
}
