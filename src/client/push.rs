use super::LibraryClient;
use super::metadata::{EntityKind, LibraryPath, MetadataStore};
use crate::concurrency::progress::BoxedReader;
use crate::concurrency::sink::{PositionalSource, SourceReader, read_exact_at_blocking};
use crate::digest::{Digest, digest_source};
use crate::error::{LibraryError, Result};
use crate::image::config::SifConfig;
use crate::image::manifest::{
    ANNOTATION_TITLE, Descriptor, ImageManifest, MEDIA_TYPE_SIF_CONFIG, MEDIA_TYPE_SIF_LAYER,
};
use crate::registry::auth::AccessType;
use crate::registry::operations::OciAccess;
use crate::upload::callback::UploadCallback;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// `entity/collection/container`
    pub path: String,
    pub tags: Vec<String>,
    pub description: String,
}

impl PushRequest {
    pub fn new(path: &str, tags: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

impl LibraryClient {
    /// Upload `source` as an image of `request.path` and tag it; returns the image digest
    pub async fn push(
        &self,
        request: &PushRequest,
        source: Arc<dyn PositionalSource>,
        callback: &dyn UploadCallback,
    ) -> Result<Digest> {
        let start = Instant::now();
        let metadata = self
            .metadata
            .as_deref()
            .ok_or_else(|| LibraryError::Config("push requires a metadata store".to_string()))?;
        let path = LibraryPath::parse(&request.path)?;
        self.output.step(&format!("Pushing {}", path.container_path()));

        let container_id = self.resolve_container(metadata, &path).await?;

        self.output.detail("Computing image digest");
        let digest = digest_source(&source).await?;
        let (image_id, existed) = metadata
            .get_or_create(EntityKind::Image, &path.image_path(&digest))
            .await?;
        self.output.detail(&format!(
            "Image {} {} ({})",
            image_id,
            if existed { "already registered" } else { "created" },
            digest
        ));

        match self.push_oci(&path, &source, &digest, &request.description, callback).await {
            Ok(()) => {}
            Err(e) if e.is_fallback() => {
                self.output
                    .info("OCI access not available, using library protocol");
                self.legacy.upload(&image_id, &source, &digest, callback).await?;
            }
            Err(e) => return Err(e),
        }

        if !request.tags.is_empty() {
            metadata
                .set_tags(&container_id, &image_id, &request.tags)
                .await?;
            self.output
                .detail(&format!("Tagged image as {}", request.tags.join(", ")));
        }

        self.output.success(&format!(
            "Pushed {} ({}) in {}",
            path.container_path(),
            digest,
            self.output.format_duration(start.elapsed())
        ));
        Ok(digest)
    }

    async fn resolve_container(&self, metadata: &dyn MetadataStore, path: &LibraryPath) -> Result<String> {
        let steps = [
            (EntityKind::Entity, path.entity.clone()),
            (EntityKind::Collection, path.collection_path()),
            (EntityKind::Container, path.container_path()),
        ];
        let mut id = String::new();
        for (kind, step_path) in steps {
            let (step_id, existed) = metadata.get_or_create(kind, &step_path).await?;
            if !existed {
                self.output.detail(&format!("Created {} {}", kind, step_path));
            }
            id = step_id;
        }
        Ok(id)
    }

    async fn push_oci(
        &self,
        path: &LibraryPath,
        source: &Arc<dyn PositionalSource>,
        digest: &Digest,
        description: &str,
        callback: &dyn UploadCallback,
    ) -> Result<()> {
        let access = self
            .registry
            .authenticate(&path.container_path(), &[AccessType::Push, AccessType::Pull])
            .await?;
        let size = source.len()?;

        // a non-SIF source must fail before anything is uploaded
        let header_len = (self.config.transfer.header_read_size as u64).min(size) as usize;
        let header = read_exact_at_blocking(source, header_len, 0).await?;
        let config = SifConfig::from_header(&header, digest, description)?;

        if self.registry.blob_exists(&access, digest).await? {
            self.output
                .info(&format!("Image {} already in registry, skipping upload", digest));
        } else {
            self.upload_image_blob(&access, source.as_ref(), size, digest, callback)
                .await?;
        }

        let config_bytes = config.to_bytes()?;
        let config_digest = Digest::sha256_of(&config_bytes);
        if !self.registry.blob_exists(&access, &config_digest).await? {
            self.registry
                .upload_blob(&access, config_bytes.len() as i64, config_bytes.as_slice())
                .await?;
        }

        let manifest = ImageManifest::for_sif(
            Descriptor::new(MEDIA_TYPE_SIF_CONFIG, config_digest, config_bytes.len() as i64),
            Descriptor::new(MEDIA_TYPE_SIF_LAYER, digest.clone(), size as i64)
                .with_annotation(ANNOTATION_TITLE, &format!("{}.sif", path.container)),
        );
        let manifest_digest = self.registry.upload_manifest(&access, &manifest, None).await?;
        self.output
            .detail(&format!("Manifest {} uploaded ({})", manifest_digest, config.architecture));
        Ok(())
    }

    async fn upload_image_blob(
        &self,
        access: &OciAccess,
        source: &dyn PositionalSource,
        size: u64,
        digest: &Digest,
        callback: &dyn UploadCallback,
    ) -> Result<()> {
        callback.init_upload(size as i64);
        let reader: BoxedReader<'_> = Box::new(SourceReader::new(source)?);
        let reader = callback.reader(reader);

        match self.registry.upload_blob(access, size as i64, reader).await {
            Ok((uploaded, _)) => {
                callback.finish();
                digest.verify(&uploaded)
            }
            Err(e) => {
                callback.terminate();
                Err(e)
            }
        }
    }
}
