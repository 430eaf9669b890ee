//! Boundary to the library's metadata service
//!
//! Entity, collection, container and image records are managed elsewhere; push only needs to
//! resolve-or-create them by path and attach tags afterwards.

use crate::digest::Digest;
use crate::error::{LibraryError, Result};
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Entity,
    Collection,
    Container,
    Image,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Entity => "entity",
            EntityKind::Collection => "collection",
            EntityKind::Container => "container",
            EntityKind::Image => "image",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Return the record id for `path`, creating it if needed; `true` when it already existed
    async fn get_or_create(&self, kind: EntityKind, path: &str) -> Result<(String, bool)>;

    async fn set_tags(&self, container_id: &str, image_id: &str, tags: &[String]) -> Result<()>;
}

/// `entity/collection/container` split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPath {
    pub entity: String,
    pub collection: String,
    pub container: String,
}

impl LibraryPath {
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [entity, collection, container]
                if !entity.is_empty() && !collection.is_empty() && !container.is_empty() =>
            {
                Ok(Self {
                    entity: entity.to_string(),
                    collection: collection.to_string(),
                    container: container.to_string(),
                })
            }
            _ => Err(LibraryError::Config(format!(
                "library path must be entity/collection/container, got {:?}",
                path
            ))),
        }
    }

    pub fn collection_path(&self) -> String {
        format!("{}/{}", self.entity, self.collection)
    }

    pub fn container_path(&self) -> String {
        format!("{}/{}/{}", self.entity, self.collection, self.container)
    }

    /// Images are addressed by content: `entity/collection/container:sha256.<hex>`
    pub fn image_path(&self, digest: &Digest) -> String {
        format!("{}:{}", self.container_path(), digest.library_form())
    }
}
