//! Blob operations for the OCI registry
//!
//! Implements the OCI distribution blob endpoints used for SIF artifacts:
//! - existence checks (HEAD /v2/{name}/blobs/{digest})
//! - chunked upload sessions (POST, then PATCH per chunk, then PUT ?digest=)
//! - ranged downloads into a positional sink, one part per call

use crate::concurrency::partition::PartDescriptor;
use crate::concurrency::sink::{PositionalSink, write_at_blocking};
use crate::digest::{Digest, DigestHasher};
use crate::error::{LibraryError, Result};
use crate::logging::Logger;
use crate::registry::auth::Credential;
use crate::registry::operations::auth_operations::{AuthOperations, OciAccess};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

pub const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// Server-side upload in progress
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Where the next chunk goes; advanced by every PATCH response
    pub location: Url,
    /// Credential the session was opened with
    pub credential: Credential,
}

#[derive(Clone)]
pub struct BlobOperations {
    client: Client,
    auth: AuthOperations,
    output: Logger,
    max_chunk_size: usize,
}

impl BlobOperations {
    pub fn new(client: Client, auth: AuthOperations, output: Logger, max_chunk_size: usize) -> Self {
        Self {
            client,
            auth,
            output,
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    /// True only for a 200 whose `Docker-Content-Digest` equals `digest`
    pub async fn blob_exists(&self, access: &OciAccess, digest: &Digest) -> Result<bool> {
        let request = self.client.head(access.blob_url(&digest.to_string())).build()?;
        let response = match self.auth.do_request(request, Some(&access.credential)).await {
            Ok(authorized) => authorized.response,
            Err(e) if e.is_not_found() => {
                self.output
                    .detail(&format!("Blob {} does not exist in registry", short(digest)));
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if response.status() != StatusCode::OK {
            return Ok(false);
        }
        let exists = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == digest.to_string());
        self.output.detail(&format!(
            "Blob {} {}",
            short(digest),
            if exists { "exists in registry" } else { "not confirmed by registry" }
        ));
        Ok(exists)
    }

    /// Upload `reader` as a blob in sequential chunks; returns the digest and bytes written
    ///
    /// A non-negative `size` must match what the reader produces.
    pub async fn upload_blob<R>(&self, access: &OciAccess, size: i64, mut reader: R) -> Result<(Digest, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let mut session = self.open_session(access).await?;
        let mut hasher = DigestHasher::new();
        let mut buf = vec![0u8; self.max_chunk_size];

        loop {
            let n = read_chunk(&mut reader, &mut buf).await?;
            if n == 0 {
                break;
            }
            let start = hasher.bytes();
            self.upload_chunk(&mut session, &buf[..n], start).await?;
            hasher.update(&buf[..n]);
        }

        let written = hasher.bytes();
        if size >= 0 && written != size as u64 {
            return Err(LibraryError::Protocol(format!(
                "blob upload declared {} bytes but read {}",
                size, written
            )));
        }

        let digest = hasher.finalize();
        self.close_session(session, &digest).await?;
        self.output.detail(&format!(
            "Uploaded blob {} ({})",
            short(&digest),
            self.output.format_size(written)
        ));
        Ok((digest, written))
    }

    async fn open_session(&self, access: &OciAccess) -> Result<UploadSession> {
        let request = self
            .client
            .post(access.uploads_url())
            .header(CONTENT_LENGTH, "0")
            .build()?;
        let authorized = self.auth.do_request(request, Some(&access.credential)).await?;
        let credential = authorized
            .credential()
            .unwrap_or_else(|| access.credential.clone());
        let response = expect_status(authorized.response, StatusCode::ACCEPTED, "open upload session")?;
        let location = next_location(&response)?;
        self.output
            .detail(&format!("Opened upload session at {}", location.path()));
        Ok(UploadSession {
            location,
            credential,
        })
    }

    async fn upload_chunk(&self, session: &mut UploadSession, chunk: &[u8], start: u64) -> Result<()> {
        let end = start + chunk.len() as u64 - 1;
        self.output
            .debug(&format!("PATCH chunk bytes {}-{}", start, end));

        let request = self
            .client
            .patch(session.location.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, chunk.len().to_string())
            .header("Content-Range", format!("{}-{}", start, end))
            .body(chunk.to_vec())
            .build()?;
        let authorized = self.auth.do_request(request, Some(&session.credential)).await?;
        let response = expect_status(authorized.response, StatusCode::ACCEPTED, "upload chunk")?;
        session.location = next_location(&response)?;
        Ok(())
    }

    async fn close_session(&self, session: UploadSession, digest: &Digest) -> Result<()> {
        let mut url = session.location;
        url.query_pairs_mut()
            .append_pair("digest", &digest.to_string());

        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, "0")
            .build()?;
        let authorized = self.auth.do_request(request, Some(&session.credential)).await?;
        expect_status(authorized.response, StatusCode::CREATED, "close upload session")?;
        Ok(())
    }

    /// Fetch one part of a blob with a ranged GET, writing at the part's absolute offsets
    pub async fn download_blob_part(
        &self,
        access: &OciAccess,
        digest: &Digest,
        mut part: PartDescriptor,
        sink: &Arc<dyn PositionalSink>,
    ) -> Result<u64> {
        let request = self
            .client
            .get(access.blob_url(&digest.to_string()))
            .header(RANGE, part.range_header())
            .build()?;
        let mut response = self
            .auth
            .do_request(request, Some(&access.credential))
            .await?
            .response;

        let status = response.status();
        let whole_body = status == StatusCode::OK && part.start == 0;
        if status != StatusCode::PARTIAL_CONTENT && !whole_body {
            return Err(LibraryError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
                message: format!("expected 206 for range {}", part.range_header()),
            });
        }

        while let Some(chunk) = response.chunk().await? {
            if chunk.len() as u64 > part.remaining() {
                if whole_body {
                    return Err(LibraryError::Protocol(format!(
                        "registry ignored range {} and sent the whole blob",
                        part.range_header()
                    )));
                }
                return Err(LibraryError::Protocol(format!(
                    "part {} received more than {} bytes",
                    part.index,
                    part.len()
                )));
            }
            let len = chunk.len() as u64;
            write_at_blocking(sink, chunk, part.position()).await?;
            part.cursor += len;
        }

        if part.remaining() != 0 {
            return Err(LibraryError::Protocol(format!(
                "part {} ended after {} of {} bytes",
                part.index,
                part.cursor,
                part.len()
            )));
        }
        Ok(part.len())
    }

    /// Download a whole (small) blob into memory and verify its digest
    pub async fn download_blob(&self, access: &OciAccess, digest: &Digest) -> Result<Vec<u8>> {
        let request = self.client.get(access.blob_url(&digest.to_string())).build()?;
        let response = self
            .auth
            .do_request(request, Some(&access.credential))
            .await?
            .response;
        let body = response.bytes().await?;
        digest.verify(&Digest::sha256_of(&body))?;
        Ok(body.to_vec())
    }
}

/// Fill `buf` from `reader`; a short count means end of input
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn expect_status(response: Response, expected: StatusCode, context: &str) -> Result<Response> {
    if response.status() != expected {
        return Err(LibraryError::HttpStatus {
            status: response.status().as_u16(),
            url: response.url().to_string(),
            message: format!("{}: expected status {}", context, expected.as_u16()),
        });
    }
    Ok(response)
}

/// Resolve the `Location` header, which may be relative, against the response URL
fn next_location(response: &Response) -> Result<Url> {
    let value = response
        .headers()
        .get(LOCATION)
        .ok_or(LibraryError::MissingHeader("Location"))?
        .to_str()
        .map_err(|_| LibraryError::MalformedHeader {
            header: "Location",
            value: "<non-ascii>".to_string(),
        })?;
    Ok(response.url().join(value)?)
}

fn short(digest: &Digest) -> String {
    let hex = digest.hex();
    format!("{}:{}", digest.algorithm(), hex.get(..12).unwrap_or(hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_chunk_fills_across_short_reads() {
        let data: &[u8] = b"0123456789";
        let mut reader = tokio::io::BufReader::with_capacity(3, data);
        let mut buf = [0u8; 4];
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 2);
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_short_digest() {
        let digest = Digest::sha256_of(b"x");
        assert_eq!(short(&digest), format!("sha256:{}", &digest.hex()[..12]));
    }
}
