//! OCI registry client
//!
//! [`RegistryClient`] wires the auth, blob and manifest operations onto one shared HTTP client
//! and exposes them as a single façade. Build it with [`RegistryClientBuilder`].

use crate::concurrency::partition::PartDescriptor;
use crate::concurrency::sink::PositionalSink;
use crate::config::ClientConfig;
use crate::digest::Digest;
use crate::error::Result;
use crate::image::manifest::{Descriptor, ImageIndex, ImageManifest};
use crate::logging::Logger;
use crate::registry::auth::{AccessType, Credential};
use crate::registry::operations::{
    AuthOperations, AuthorizedResponse, BlobOperations, ManifestOperations, ManifestResponse,
    OciAccess,
};
use reqwest::Request;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub struct RegistryClientBuilder {
    config: ClientConfig,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            output: Logger::default(),
        }
    }

    pub fn with_output(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.config.validate()?;
        let client = self.config.registry_http_client()?;
        let library_client = self.config.library_http_client()?;

        let auth = AuthOperations::new(
            client.clone(),
            library_client,
            self.config.base_url.clone(),
            self.config.auth_token.clone(),
            self.output.clone(),
        );
        let blobs = BlobOperations::new(
            client.clone(),
            auth.clone(),
            self.output.clone(),
            self.config.transfer.max_chunk_size,
        );
        let manifests = ManifestOperations::new(client, auth.clone(), blobs.clone(), self.output.clone());

        Ok(RegistryClient {
            auth,
            blobs,
            manifests,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    auth: AuthOperations,
    blobs: BlobOperations,
    manifests: ManifestOperations,
}

impl RegistryClient {
    pub fn builder(config: ClientConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(config)
    }

    pub async fn authenticate(&self, namespace: &str, access_types: &[AccessType]) -> Result<OciAccess> {
        self.auth.authenticate(namespace, access_types).await
    }

    pub async fn do_request(&self, request: Request, credential: Option<&Credential>) -> Result<AuthorizedResponse> {
        self.auth.do_request(request, credential).await
    }

    pub async fn blob_exists(&self, access: &OciAccess, digest: &Digest) -> Result<bool> {
        self.blobs.blob_exists(access, digest).await
    }

    pub async fn upload_blob<R>(&self, access: &OciAccess, size: i64, reader: R) -> Result<(Digest, u64)>
    where
        R: AsyncRead + Unpin,
    {
        self.blobs.upload_blob(access, size, reader).await
    }

    pub async fn download_blob_part(
        &self,
        access: &OciAccess,
        digest: &Digest,
        part: PartDescriptor,
        sink: &Arc<dyn PositionalSink>,
    ) -> Result<u64> {
        self.blobs.download_blob_part(access, digest, part, sink).await
    }

    pub async fn download_manifest(
        &self,
        access: &OciAccess,
        reference: &str,
        media_types: &[&str],
    ) -> Result<ManifestResponse> {
        self.manifests.download_manifest(access, reference, media_types).await
    }

    pub async fn upload_manifest(
        &self,
        access: &OciAccess,
        manifest: &ImageManifest,
        reference: Option<&str>,
    ) -> Result<Digest> {
        self.manifests.upload_manifest(access, manifest, reference).await
    }

    pub fn get_manifest_from_index<'a>(&self, index: &'a ImageIndex, arch: &str) -> Result<&'a Descriptor> {
        self.manifests.get_manifest_from_index(index, arch)
    }

    pub async fn get_image_details(&self, access: &OciAccess, tag: &str, arch: &str) -> Result<Descriptor> {
        self.manifests.get_image_details(access, tag, arch).await
    }
}
