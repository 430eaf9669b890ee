//! Config blob attached to a SIF manifest

use crate::digest::Digest;
use crate::error::Result;
use crate::image::sif::SifHeader;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<Digest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SifConfig {
    pub architecture: String,
    pub os: String,
    pub rootfs: RootFs,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub encrypted: bool,
}

impl SifConfig {
    /// Describe the image whose first bytes are `bytes` and whose content digest is `layer`
    pub fn from_header(bytes: &[u8], layer: &Digest, description: &str) -> Result<Self> {
        let header = SifHeader::parse(bytes)?;
        Ok(Self {
            architecture: header.architecture(),
            os: "linux".to_string(),
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids: vec![layer.clone()],
            },
            description: description.to_string(),
            signed: header.is_signed(),
            encrypted: header.is_encrypted(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::sif::testing::{DescriptorSpec, build_header};
    use crate::image::sif::PART_PRIMARY_SYSTEM;

    #[test]
    fn test_config_from_header() {
        let bytes = build_header(
            "04",
            &[
                DescriptorSpec::partition(1, PART_PRIMARY_SYSTEM, "04"),
                DescriptorSpec::signature(),
            ],
        );
        let layer = Digest::sha256_of(b"image");
        let config = SifConfig::from_header(&bytes, &layer, "test image").unwrap();

        assert_eq!(config.architecture, "arm64");
        assert_eq!(config.os, "linux");
        assert_eq!(config.rootfs.diff_ids, vec![layer]);
        assert!(config.signed);
        assert!(!config.encrypted);

        let value: serde_json::Value = serde_json::from_slice(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(value["rootfs"]["type"], "layers");
        assert_eq!(value["description"], "test image");
        assert_eq!(SifConfig::from_bytes(&config.to_bytes().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_config_rejects_non_sif() {
        assert!(SifConfig::from_header(b"not a sif", &Digest::sha256_of(b""), "").is_err());
    }
}
