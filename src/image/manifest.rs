//! OCI manifest and index documents for SIF artifacts

use crate::digest::Digest;
use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_SIF_CONFIG: &str = "application/vnd.sylabs.sif.config.v1+json";
pub const MEDIA_TYPE_SIF_LAYER: &str = "application/vnd.sylabs.sif.layer.v1.sif";

/// Annotation carrying the file name of a layer
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: &str, digest: Digest, size: i64) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest,
            size,
            platform: None,
            annotations: None,
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ImageManifest {
    /// Manifest for a single SIF layer
    pub fn for_sif(config: Descriptor, layer: Descriptor) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_IMAGE_MANIFEST.to_string()),
            config,
            layers: vec![layer],
            annotations: None,
        }
    }

    /// Check that this manifest describes exactly one SIF and return its layer
    pub fn sif_layer(&self) -> Result<&Descriptor> {
        if self.config.media_type != MEDIA_TYPE_SIF_CONFIG {
            return Err(LibraryError::UnexpectedMediaType {
                expected: MEDIA_TYPE_SIF_CONFIG.to_string(),
                actual: self.config.media_type.clone(),
            });
        }
        let [layer] = self.layers.as_slice() else {
            return Err(LibraryError::UnexpectedLayerCount(self.layers.len()));
        };
        if layer.media_type != MEDIA_TYPE_SIF_LAYER {
            return Err(LibraryError::UnexpectedMediaType {
                expected: MEDIA_TYPE_SIF_LAYER.to_string(),
                actual: layer.media_type.clone(),
            });
        }
        Ok(layer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// Pick the image manifest for `arch`; an empty `arch` only works for single-manifest indexes
    pub fn select(&self, arch: &str) -> Result<&Descriptor> {
        let mut images = self
            .manifests
            .iter()
            .filter(|d| d.media_type == MEDIA_TYPE_IMAGE_MANIFEST);

        if arch.is_empty() {
            let images: Vec<&Descriptor> = images.collect();
            return match images.as_slice() {
                [only] => Ok(only),
                _ => Err(LibraryError::ArchNotSpecified(images.len())),
            };
        }

        images
            .find(|d| d.platform.as_ref().is_some_and(|p| p.architecture == arch))
            .ok_or_else(|| LibraryError::NoMatchingArchitecture(arch.to_string()))
    }
}

/// Either document a manifest endpoint may return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestDocument {
    Manifest(ImageManifest),
    Index(ImageIndex),
}

impl ManifestDocument {
    /// Decode by the response `Content-Type`
    pub fn parse(media_type: &str, body: &[u8]) -> Result<Self> {
        match media_type {
            MEDIA_TYPE_IMAGE_MANIFEST => Ok(ManifestDocument::Manifest(serde_json::from_slice(body)?)),
            MEDIA_TYPE_IMAGE_INDEX => Ok(ManifestDocument::Index(serde_json::from_slice(body)?)),
            other => Err(LibraryError::UnexpectedContentType {
                expected: format!("{} or {}", MEDIA_TYPE_IMAGE_MANIFEST, MEDIA_TYPE_IMAGE_INDEX),
                actual: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_entry(arch: &str, seed: &[u8]) -> Descriptor {
        Descriptor::new(MEDIA_TYPE_IMAGE_MANIFEST, Digest::sha256_of(seed), 100).with_platform(
            Platform {
                architecture: arch.to_string(),
                os: "linux".to_string(),
                variant: None,
            },
        )
    }

    fn index(entries: Vec<Descriptor>) -> ImageIndex {
        ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_IMAGE_INDEX.to_string()),
            manifests: entries,
        }
    }

    #[test]
    fn test_select_by_architecture() {
        let idx = index(vec![manifest_entry("amd64", b"a"), manifest_entry("arm64", b"b")]);
        assert_eq!(idx.select("arm64").unwrap().digest, Digest::sha256_of(b"b"));
        assert_eq!(idx.select("amd64").unwrap().digest, Digest::sha256_of(b"a"));
    }

    #[test]
    fn test_select_without_architecture() {
        let idx = index(vec![manifest_entry("amd64", b"a"), manifest_entry("arm64", b"b")]);
        assert!(matches!(idx.select(""), Err(LibraryError::ArchNotSpecified(2))));

        let idx = index(vec![manifest_entry("amd64", b"a")]);
        assert_eq!(idx.select("").unwrap().digest, Digest::sha256_of(b"a"));
    }

    #[test]
    fn test_select_no_match() {
        let idx = index(vec![manifest_entry("amd64", b"a")]);
        assert!(matches!(
            idx.select("ppc64le"),
            Err(LibraryError::NoMatchingArchitecture(a)) if a == "ppc64le"
        ));
    }

    #[test]
    fn test_sif_layer_validation() {
        let config = Descriptor::new(MEDIA_TYPE_SIF_CONFIG, Digest::sha256_of(b"c"), 10);
        let layer = Descriptor::new(MEDIA_TYPE_SIF_LAYER, Digest::sha256_of(b"l"), 20);
        let manifest = ImageManifest::for_sif(config.clone(), layer.clone());
        assert_eq!(manifest.sif_layer().unwrap(), &layer);

        let mut two = manifest.clone();
        two.layers.push(layer.clone());
        assert!(matches!(two.sif_layer(), Err(LibraryError::UnexpectedLayerCount(2))));

        let mut wrong = manifest.clone();
        wrong.config.media_type = "application/vnd.oci.image.config.v1+json".into();
        assert!(matches!(wrong.sif_layer(), Err(LibraryError::UnexpectedMediaType { .. })));
    }

    #[test]
    fn test_manifest_json_shape() {
        let config = Descriptor::new(MEDIA_TYPE_SIF_CONFIG, Digest::sha256_of(b"c"), 10);
        let layer = Descriptor::new(MEDIA_TYPE_SIF_LAYER, Digest::sha256_of(b"l"), 20)
            .with_annotation(ANNOTATION_TITLE, "image.sif");
        let value = serde_json::to_value(ImageManifest::for_sif(config, layer)).unwrap();

        assert_eq!(value["schemaVersion"], 2);
        assert_eq!(value["mediaType"], MEDIA_TYPE_IMAGE_MANIFEST);
        assert_eq!(value["layers"][0]["annotations"][ANNOTATION_TITLE], "image.sif");
        assert!(value["config"].get("platform").is_none());
    }

    #[test]
    fn test_document_parse_rejects_other_types() {
        assert!(matches!(
            ManifestDocument::parse("application/json", b"{}"),
            Err(LibraryError::UnexpectedContentType { .. })
        ));
    }
}
