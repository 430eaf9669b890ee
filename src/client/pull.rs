use super::LibraryClient;
use crate::concurrency::progress::ProgressReporter;
use crate::concurrency::sink::PositionalSink;
use crate::digest::digest_sink;
use crate::error::Result;
use crate::registry::auth::AccessType;
use std::sync::Arc;
use std::time::Instant;

impl LibraryClient {
    /// Download `path:tag` into `sink`, returning the image size
    ///
    /// `arch` selects from multi-architecture images; empty means "the only one there is".
    pub async fn pull(
        &self,
        path: &str,
        tag: &str,
        arch: &str,
        sink: Arc<dyn PositionalSink>,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        let start = Instant::now();
        self.output.step(&format!("Pulling {}:{}", path, tag));

        let size = match self.pull_oci(path, tag, arch, &sink, progress).await {
            Err(e) if e.is_fallback() => {
                self.output
                    .info("OCI access not available, using library protocol");
                self.legacy
                    .download(path, tag, arch, &sink, &self.config.transfer.download, progress)
                    .await?
            }
            other => other?,
        };

        self.output.success(&format!(
            "Pulled {}:{} ({}) in {}",
            path,
            tag,
            self.output.format_size(size),
            self.output.format_duration(start.elapsed())
        ));
        Ok(size)
    }

    async fn pull_oci(
        &self,
        path: &str,
        tag: &str,
        arch: &str,
        sink: &Arc<dyn PositionalSink>,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        let access = self.registry.authenticate(path, &[AccessType::Pull]).await?;
        let layer = self.registry.get_image_details(&access, tag, arch).await?;

        progress.init(layer.size);
        let moved = self
            .engine
            .transfer(
                layer.size,
                &self.config.transfer.download,
                {
                    let registry = self.registry.clone();
                    let digest = layer.digest.clone();
                    let sink = Arc::clone(sink);
                    move |part| {
                        let (registry, access, digest, sink) =
                            (registry.clone(), access.clone(), digest.clone(), Arc::clone(&sink));
                        async move {
                            registry
                                .download_blob_part(&access, &digest, part, &sink)
                                .await
                        }
                    }
                },
                progress,
            )
            .await?;
        progress.wait();

        self.output.detail("Verifying image digest");
        let actual = digest_sink(sink, moved).await?;
        layer.digest.verify(&actual)?;
        Ok(moved)
    }
}
