//! Library protocol downloads
//!
//! `GET /v1/imagefile/{path}:{tag}` is sent with a `Range` for the first part. The reply decides
//! the mode:
//! - 303 (or any redirect): follow `Location`, at most [`MAX_REDIRECTS`] times
//! - 200: the server ignored the range, copy the single body stream
//! - 206: write the first part, then fetch the rest concurrently

use super::{LegacyClient, MAX_REDIRECTS, check_success, parse_content_range};
use crate::concurrency::config::TransferSpec;
use crate::concurrency::partition::{self, PartDescriptor};
use crate::concurrency::progress::ProgressReporter;
use crate::concurrency::sink::{PositionalSink, write_at_blocking};
use crate::error::handlers::HttpErrorHandler;
use crate::error::{LibraryError, Result};
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use url::Url;

/// Where the image bytes were finally found
#[derive(Clone)]
struct ResolvedSource {
    url: Url,
    send_credentials: bool,
}

impl LegacyClient {
    /// Download `path:tag` into `sink`; returns the image size
    pub async fn download(
        &self,
        path: &str,
        tag: &str,
        arch: &str,
        sink: &Arc<dyn PositionalSink>,
        spec: &TransferSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        if spec.part_size <= 0 {
            return Err(LibraryError::InvalidPartSize(spec.part_size));
        }

        let mut url = self.endpoint(&format!("v1/imagefile/{}:{}", path.trim_matches('/'), tag))?;
        if !arch.is_empty() {
            url.query_pairs_mut().append_pair("arch", arch);
        }
        let first_range = format!("bytes=0-{}", spec.part_size - 1);

        let mut redirects = 0;
        let mut source = ResolvedSource {
            url,
            send_credentials: true,
        };

        loop {
            self.output.detail(&format!("GET {}", source.url));
            let mut request = self.client.get(source.url.clone()).header(RANGE, &first_range);
            if source.send_credentials {
                request = self.authorize(request);
            }
            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(LibraryError::TooManyRedirects(MAX_REDIRECTS));
                }
                source = self.follow_redirect(&response)?;
                continue;
            }

            return match status {
                StatusCode::OK => self.single_stream(response, sink, progress).await,
                StatusCode::PARTIAL_CONTENT => {
                    self.multi_stream(response, &source, sink, spec, progress)
                        .await
                }
                _ => Err(HttpErrorHandler::from_response(response, "image download").await),
            };
        }
    }

    fn follow_redirect(&self, response: &Response) -> Result<ResolvedSource> {
        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(LibraryError::MissingHeader("Location"))?
            .to_str()
            .map_err(|_| LibraryError::MalformedHeader {
                header: "Location",
                value: "<non-ascii>".to_string(),
            })?;
        let url = response.url().join(location)?;
        let send_credentials = self.is_same_origin(&url);
        if !send_credentials {
            self.output.detail(&format!(
                "Redirected to {}, not sending library credentials",
                url.host_str().unwrap_or_default()
            ));
        }
        Ok(ResolvedSource {
            url,
            send_credentials,
        })
    }

    async fn single_stream(
        &self,
        mut response: Response,
        sink: &Arc<dyn PositionalSink>,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        let expected = response.content_length();
        self.output
            .verbose("Server does not support ranged requests, using a single stream");
        progress.init(expected.map(|n| n as i64).unwrap_or(-1));

        let mut written = 0u64;
        let result: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                let len = chunk.len() as u64;
                write_at_blocking(sink, chunk, written).await?;
                written += len;
                progress.increment_by(len);
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            progress.abort(true);
            return Err(e);
        }

        if let Some(expected) = expected.filter(|n| *n != written) {
            progress.abort(true);
            return Err(LibraryError::Protocol(format!(
                "image stream ended after {} of {} bytes",
                written, expected
            )));
        }
        progress.wait();
        Ok(written)
    }

    async fn multi_stream(
        &self,
        mut response: Response,
        source: &ResolvedSource,
        sink: &Arc<dyn PositionalSink>,
        spec: &TransferSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or(LibraryError::MissingHeader("Content-Range"))?
            .to_str()
            .map_err(|_| LibraryError::MalformedHeader {
                header: "Content-Range",
                value: "<non-ascii>".to_string(),
            })?
            .to_string();
        let (start, end, total) = parse_content_range(&content_range)?;
        if start != 0 {
            return Err(LibraryError::MalformedHeader {
                header: "Content-Range",
                value: content_range,
            });
        }

        let plan = partition::plan(total, spec)?;
        let Some((first, rest)) = plan.parts.split_first() else {
            return Ok(0);
        };
        if first.end != end {
            return Err(LibraryError::Protocol(format!(
                "first part covers bytes 0-{} but {} was requested",
                end,
                first.range_header()
            )));
        }

        self.output.verbose(&format!(
            "Downloading {} in {} parts with {} workers",
            self.output.format_size(plan.size),
            plan.parts.len(),
            plan.concurrency
        ));
        progress.init(total);

        let first_len = match write_part_body(&mut response, *first, sink).await {
            Ok(n) => n,
            Err(e) => {
                progress.abort(true);
                return Err(e);
            }
        };
        progress.increment_by(first_len);

        self.engine
            .run(
                rest.to_vec(),
                plan.concurrency,
                {
                    let client = self.clone();
                    let source = source.clone();
                    let sink = Arc::clone(sink);
                    move |part| {
                        let (client, source, sink) = (client.clone(), source.clone(), Arc::clone(&sink));
                        async move { client.download_part(&source, part, &sink).await }
                    }
                },
                progress,
            )
            .await?;
        progress.wait();
        Ok(plan.size)
    }

    async fn download_part(
        &self,
        source: &ResolvedSource,
        part: PartDescriptor,
        sink: &Arc<dyn PositionalSink>,
    ) -> Result<u64> {
        let mut request = self
            .client
            .get(source.url.clone())
            .header(RANGE, part.range_header());
        if source.send_credentials {
            request = self.authorize(request);
        }
        let response = request.send().await?;
        let mut response = check_success(response, "image part download").await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(LibraryError::HttpStatus {
                status: response.status().as_u16(),
                url: source.url.to_string(),
                message: format!("expected 206 for range {}", part.range_header()),
            });
        }
        write_part_body(&mut response, part, sink).await
    }
}

/// Stream a response body into `part` of the sink; the body must fill the part exactly
async fn write_part_body(
    response: &mut Response,
    mut part: PartDescriptor,
    sink: &Arc<dyn PositionalSink>,
) -> Result<u64> {
    while let Some(chunk) = response.chunk().await? {
        if chunk.len() as u64 > part.remaining() {
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
