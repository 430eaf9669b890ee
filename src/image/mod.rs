//! SIF image description
//!
//! This module holds the documents that describe a SIF artifact on an OCI registry:
//! - [`manifest`]: OCI image manifest and index types, media types, architecture selection
//! - [`config`]: the SIF config blob referenced by the manifest
//! - [`sif`]: decoding of the SIF global header and descriptor table the config is derived from

pub mod config;
pub mod manifest;
pub mod sif;

pub use config::{RootFs, SifConfig};
pub use manifest::{
    Descriptor, ImageIndex, ImageManifest, ManifestDocument, Platform, MEDIA_TYPE_IMAGE_INDEX,
    MEDIA_TYPE_IMAGE_MANIFEST, MEDIA_TYPE_SIF_CONFIG, MEDIA_TYPE_SIF_LAYER,
};
pub use sif::SifHeader;
