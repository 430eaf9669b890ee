//! Manifest operations for the OCI registry
//!
//! Implements content-addressed manifest transfer and image resolution:
//! - manifest download (GET /v2/{name}/manifests/{reference}) with strict content-type checks
//! - manifest upload (PUT /v2/{name}/manifests/{reference}), digest of the marshaled bytes
//! - resolving `name:tag` (possibly through an index) to the single SIF layer descriptor

use crate::digest::Digest;
use crate::error::{LibraryError, Result};
use crate::image::config::SifConfig;
use crate::image::manifest::{
    Descriptor, ImageIndex, ImageManifest, ManifestDocument, MEDIA_TYPE_IMAGE_INDEX,
    MEDIA_TYPE_IMAGE_MANIFEST,
};
use crate::logging::Logger;
use crate::registry::operations::auth_operations::{AuthOperations, OciAccess};
use crate::registry::operations::blob_operations::{BlobOperations, DOCKER_CONTENT_DIGEST};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// Raw manifest body as served by the registry
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    /// Digest declared by the registry
    pub digest: Digest,
    pub media_type: String,
    pub body: Vec<u8>,
}

impl ManifestResponse {
    pub fn document(&self) -> Result<ManifestDocument> {
        ManifestDocument::parse(&self.media_type, &self.body)
    }
}

#[derive(Clone)]
pub struct ManifestOperations {
    client: Client,
    auth: AuthOperations,
    blobs: BlobOperations,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(client: Client, auth: AuthOperations, blobs: BlobOperations, output: Logger) -> Self {
        Self {
            client,
            auth,
            blobs,
            output,
        }
    }

    /// Fetch `reference`, accepting only the listed media types
    pub async fn download_manifest(
        &self,
        access: &OciAccess,
        reference: &str,
        media_types: &[&str],
    ) -> Result<ManifestResponse> {
        let request = self
            .client
            .get(access.manifest_url(reference))
            .header(ACCEPT, media_types.join(", "))
            .build()?;
        let response = self
            .auth
            .do_request(request, Some(&access.credential))
            .await?
            .response;

        let declared = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .ok_or(LibraryError::MissingHeader(DOCKER_CONTENT_DIGEST))?
            .to_str()
            .map_err(|_| LibraryError::MalformedHeader {
                header: DOCKER_CONTENT_DIGEST,
                value: "<non-ascii>".to_string(),
            })?;
        let digest: Digest = declared.parse().map_err(|_| LibraryError::MalformedHeader {
            header: DOCKER_CONTENT_DIGEST,
            value: declared.to_string(),
        })?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !media_types.contains(&content_type.as_str()) {
            return Err(LibraryError::UnexpectedContentType {
                expected: media_types.join(" or "),
                actual: content_type,
            });
        }

        let body = response.bytes().await?.to_vec();
        if let Ok(expected) = reference.parse::<Digest>() {
            expected.verify(&Digest::sha256_of(&body))?;
        }

        self.output.detail(&format!(
            "Fetched {} for {}:{} ({})",
            content_type, access.name, reference, digest
        ));
        Ok(ManifestResponse {
            digest,
            media_type: content_type,
            body,
        })
    }

    /// Store `manifest`; the reference defaults to the digest of its bytes
    pub async fn upload_manifest(
        &self,
        access: &OciAccess,
        manifest: &ImageManifest,
        reference: Option<&str>,
    ) -> Result<Digest> {
        let body = serde_json::to_vec(manifest)?;
        let digest = Digest::sha256_of(&body);
        let reference = reference
            .map(str::to_string)
            .unwrap_or_else(|| digest.to_string());

        self.output.verbose(&format!(
            "Uploading manifest {} as {}:{}",
            digest, access.name, reference
        ));
        let request = self
            .client
            .put(access.manifest_url(&reference))
            .header(CONTENT_TYPE, MEDIA_TYPE_IMAGE_MANIFEST)
            .body(body)
            .build()?;
        self.auth
            .do_request(request, Some(&access.credential))
            .await?;

        Ok(digest)
    }

    pub fn get_manifest_from_index<'a>(&self, index: &'a ImageIndex, arch: &str) -> Result<&'a Descriptor> {
        let selected = index.select(arch)?;
        self.output.detail(&format!(
            "Selected manifest {} for architecture {:?}",
            selected.digest, arch
        ));
        Ok(selected)
    }

    /// Resolve `tag` to the SIF layer descriptor, checking config and architecture
    pub async fn get_image_details(&self, access: &OciAccess, tag: &str, arch: &str) -> Result<Descriptor> {
        let fetched = self
            .download_manifest(access, tag, &[MEDIA_TYPE_IMAGE_MANIFEST, MEDIA_TYPE_IMAGE_INDEX])
            .await?;

        let manifest = match fetched.document()? {
            ManifestDocument::Manifest(manifest) => manifest,
            ManifestDocument::Index(index) => {
                let selected = self.get_manifest_from_index(&index, arch)?;
                let fetched = self
                    .download_manifest(
                        access,
                        &selected.digest.to_string(),
                        &[MEDIA_TYPE_IMAGE_MANIFEST],
                    )
                    .await?;
                match fetched.document()? {
                    ManifestDocument::Manifest(manifest) => manifest,
                    ManifestDocument::Index(_) => {
                        return Err(LibraryError::Protocol(
                            "image index points at another index".to_string(),
                        ));
                    }
                }
            }
        };

        let layer = manifest.sif_layer()?.clone();

        let config_bytes = self.blobs.download_blob(access, &manifest.config.digest).await?;
        let config = SifConfig::from_bytes(&config_bytes)?;
        if !arch.is_empty() && config.architecture != arch {
            return Err(LibraryError::UnexpectedArchitecture {
                expected: arch.to_string(),
                actual: config.architecture,
            });
        }

        self.output.verbose(&format!(
            "Resolved {}:{} to {} ({}, {})",
            access.name,
            tag,
            layer.digest,
            config.architecture,
            self.output.format_size(layer.size.max(0) as u64)
        ));
        Ok(layer)
    }
}
