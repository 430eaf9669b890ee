//! Library protocol uploads
//!
//! Small images are sent with one presigned PUT; anything above the multipart threshold is
//! split into the parts the service asks for and pushed concurrently, each to its own
//! presigned URL.

use super::{LegacyClient, check_success};
use crate::concurrency::config::TransferSpec;
use crate::concurrency::partition::{self, PartDescriptor};
use crate::concurrency::progress::BoxedReader;
use crate::concurrency::sink::{PositionalSource, SourceReader, read_exact_at_blocking};
use crate::digest::Digest;
use crate::error::{LibraryError, Result};
use crate::upload::callback::UploadCallback;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

const AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadImageRequest<'a> {
    filesize: u64,
    sha256sum: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadImageResponse {
    #[serde(rename = "uploadURL")]
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct MultipartStartRequest {
    filesize: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultipartStartResponse {
    #[serde(rename = "uploadID")]
    upload_id: String,
    total_parts: usize,
    part_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PartRequest<'a> {
    #[serde(rename = "uploadID")]
    upload_id: &'a str,
    part_number: usize,
    part_size: u64,
    sha256sum: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    #[serde(rename = "presignedURL")]
    presigned_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedPart {
    part_number: usize,
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MultipartCompleteRequest<'a> {
    #[serde(rename = "uploadID")]
    upload_id: &'a str,
    completed_parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize)]
struct MultipartAbortRequest<'a> {
    #[serde(rename = "uploadID")]
    upload_id: &'a str,
}

impl LegacyClient {
    /// Upload `source`, whose content digest is `digest`, as the file of image `image_id`
    pub async fn upload(
        &self,
        image_id: &str,
        source: &Arc<dyn PositionalSource>,
        digest: &Digest,
        callback: &dyn UploadCallback,
    ) -> Result<u64> {
        let size = source.len()?;
        self.output.verbose(&format!(
            "Uploading {} to image {} over the library protocol",
            self.output.format_size(size),
            image_id
        ));

        if size <= self.config.transfer.multipart_threshold {
            self.upload_single(image_id, source.as_ref(), size, digest, callback)
                .await
        } else {
            self.upload_multipart(image_id, source, size, callback)
                .await
        }
    }

    async fn upload_single(
        &self,
        image_id: &str,
        source: &dyn PositionalSource,
        size: u64,
        digest: &Digest,
        callback: &dyn UploadCallback,
    ) -> Result<u64> {
        let url = self.endpoint(&format!("v2/imagefile/{}", image_id))?;
        let start: Envelope<UploadImageResponse> = self
            .send_json(
                self.client.post(url).json(&UploadImageRequest {
                    filesize: size,
                    sha256sum: digest.hex(),
                }),
                "upload request",
            )
            .await?;

        callback.init_upload(size as i64);
        let result = self
            .put_presigned(&start.data.upload_url, source, size, digest, callback)
            .await;
        match result {
            Ok(()) => callback.finish(),
            Err(e) => {
                callback.terminate();
                return Err(e);
            }
        }

        let url = self.endpoint(&format!("v2/imagefile/{}/_complete", image_id))?;
        let response = self
            .authorize(self.client.put(url).json(&serde_json::json!({})))
            .send()
            .await?;
        check_success(response, "upload completion").await?;

        self.output.success(&format!(
            "Uploaded {} to image {}",
            self.output.format_size(size),
            image_id
        ));
        Ok(size)
    }

    async fn put_presigned(
        &self,
        upload_url: &str,
        source: &dyn PositionalSource,
        size: u64,
        digest: &Digest,
        callback: &dyn UploadCallback,
    ) -> Result<()> {
        let reader: BoxedReader<'_> = Box::new(SourceReader::new(source)?);
        let mut reader = callback.reader(reader);
        let mut body = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut body).await?;
        drop(reader);

        // presigned URLs carry their own authorization
        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, body.len().to_string())
            .header(AMZ_CONTENT_SHA256, digest.hex())
            .body(body)
            .send()
            .await?;
        check_success(response, "image upload").await?;
        Ok(())
    }

    async fn upload_multipart(
        &self,
        image_id: &str,
        source: &Arc<dyn PositionalSource>,
        size: u64,
        callback: &dyn UploadCallback,
    ) -> Result<u64> {
        let url = self.endpoint(&format!("v2/imagefile/{}/_multipart", image_id))?;
        let start: Envelope<MultipartStartResponse> = self
            .send_json(
                self.client.post(url).json(&MultipartStartRequest { filesize: size }),
                "multipart upload start",
            )
            .await?;
        let upload = start.data;
        self.output.detail(&format!(
            "Multipart upload {}: {} parts of {}",
            upload.upload_id,
            upload.total_parts,
            self.output.format_size(upload.part_size.max(0) as u64)
        ));

        match self
            .push_parts(image_id, &upload, source, size, callback)
            .await
        {
            Ok(completed) => {
                self.complete_multipart(image_id, &upload.upload_id, completed)
                    .await?;
                self.output.success(&format!(
                    "Uploaded {} to image {} in {} parts",
                    self.output.format_size(size),
                    image_id,
                    upload.total_parts
                ));
                Ok(size)
            }
            Err(e) => {
                self.abort_multipart(image_id, &upload.upload_id).await;
                Err(e)
            }
        }
    }

    async fn push_parts(
        &self,
        image_id: &str,
        upload: &MultipartStartResponse,
        source: &Arc<dyn PositionalSource>,
        size: u64,
        callback: &dyn UploadCallback,
    ) -> Result<Vec<CompletedPart>> {
        let spec = TransferSpec::new(self.config.transfer.download.concurrency, upload.part_size);
        let plan = partition::plan(size as i64, &spec)?;
        if plan.parts.len() != upload.total_parts {
            return Err(LibraryError::Protocol(format!(
                "service expects {} parts but {} bytes in parts of {} make {}",
                upload.total_parts,
                size,
                upload.part_size,
                plan.parts.len()
            )));
        }

        let completed = Arc::new(Mutex::new(Vec::with_capacity(plan.parts.len())));
        let progress = callback.part_progress();
        progress.init(size as i64);
        self.engine
            .run(
                plan.parts,
                plan.concurrency,
                {
                    let client = self.clone();
                    let image_id = image_id.to_string();
                    let upload_id = upload.upload_id.clone();
                    let source = Arc::clone(source);
                    let completed = Arc::clone(&completed);
                    move |part| {
                        let client = client.clone();
                        let (image_id, upload_id) = (image_id.clone(), upload_id.clone());
                        let (source, completed) = (Arc::clone(&source), Arc::clone(&completed));
                        async move {
                            client
                                .upload_part(&image_id, &upload_id, &source, part, &completed)
                                .await
                        }
                    }
                },
                progress,
            )
            .await?;
        progress.wait();

        let mut completed = std::mem::take(
            &mut *completed
                .lock()
                .map_err(|_| LibraryError::Protocol("completed part list poisoned".to_string()))?,
        );
        completed.sort_by_key(|p| p.part_number);
        Ok(completed)
    }

    async fn upload_part(
        &self,
        image_id: &str,
        upload_id: &str,
        source: &Arc<dyn PositionalSource>,
        part: PartDescriptor,
        completed: &Mutex<Vec<CompletedPart>>,
    ) -> Result<u64> {
        let body = read_exact_at_blocking(source, part.len() as usize, part.start).await?;
        let part_digest = Digest::sha256_of(&body);
        let part_number = part.index + 1;

        let url = self.endpoint(&format!("v2/imagefile/{}/_multipart", image_id))?;
        let presigned: Envelope<PartResponse> = self
            .send_json(
                self.client.put(url).json(&PartRequest {
                    upload_id,
                    part_number,
                    part_size: part.len(),
                    sha256sum: part_digest.hex(),
                }),
                "multipart part request",
            )
            .await?;

        let response = self
            .client
            .put(&presigned.data.presigned_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, body.len().to_string())
            .header(AMZ_CONTENT_SHA256, part_digest.hex())
            .body(body)
            .send()
            .await?;
        let response = check_success(response, "multipart part upload").await?;
        let token = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .ok_or(LibraryError::MissingHeader("ETag"))?
            .to_string();

        completed
            .lock()
            .map_err(|_| LibraryError::Protocol("completed part list poisoned".to_string()))?
            .push(CompletedPart { part_number, token });
        Ok(part.len())
    }

    async fn complete_multipart(&self, image_id: &str, upload_id: &str, parts: Vec<CompletedPart>) -> Result<()> {
        let url = self.endpoint(&format!("v2/imagefile/{}/_multipart_complete", image_id))?;
        let response = self
            .authorize(self.client.put(url).json(&MultipartCompleteRequest {
                upload_id,
                completed_parts: parts,
            }))
            .send()
            .await?;
        check_success(response, "multipart upload completion").await?;
        Ok(())
    }

    /// Best effort; the caller reports the error that caused the abort
    async fn abort_multipart(&self, image_id: &str, upload_id: &str) {
        let result: Result<()> = async {
            let url = self.endpoint(&format!("v2/imagefile/{}/_multipart_abort", image_id))?;
            let response = self
                .authorize(self.client.put(url).json(&MultipartAbortRequest { upload_id }))
                .send()
                .await?;
            check_success(response, "multipart upload abort").await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            self.output
                .warning(&format!("Failed to abort multipart upload {}: {}", upload_id, e));
        }
    }
}
