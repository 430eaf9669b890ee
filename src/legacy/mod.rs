//! Library protocol transfers
//!
//! The library service's own image file endpoints, used when a namespace is not served over
//! OCI. Downloads walk redirects by hand and switch to concurrent ranged requests when the
//! server honours `Range`; uploads go through presigned URLs, in parts for large images.

pub mod download;
pub mod upload;

use crate::concurrency::engine::TransferEngine;
use crate::config::ClientConfig;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{LibraryError, Result};
use crate::logging::Logger;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

/// Redirects followed before a download is abandoned
pub const MAX_REDIRECTS: usize = 10;

#[derive(Clone)]
pub struct LegacyClient {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
    config: ClientConfig,
    engine: TransferEngine,
    output: Logger,
}

impl LegacyClient {
    pub fn new(config: ClientConfig, output: Logger) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)?;
        Ok(Self {
            client: config.library_http_client()?,
            base_url,
            auth_token: config.auth_token.clone(),
            engine: TransferEngine::new(output.clone()),
            config,
            output,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.config.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    /// True when `url` shares scheme and host with the library base URL
    fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.base_url.scheme()
            && url.host_str() == self.base_url.host_str()
            && url.port_or_known_default() == self.base_url.port_or_known_default()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send an authorized request and decode the JSON body of a successful reply
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = self.authorize(request).send().await?;
        let response = check_success(response, context).await?;
        Ok(response.json().await?)
    }
}

async fn check_success(response: Response, context: &str) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(HttpErrorHandler::from_response(response, context).await)
    }
}

/// Parse `bytes start-end/total` into its three parts
pub fn parse_content_range(value: &str) -> Result<(u64, u64, i64)> {
    let malformed = || LibraryError::MalformedHeader {
        header: "Content-Range",
        value: value.to_string(),
    };

    let rest = value.trim().strip_prefix("bytes ").ok_or_else(malformed)?;
    let (range, total) = rest.split_once('/').ok_or_else(malformed)?;
    let (start, end) = range.split_once('-').ok_or_else(malformed)?;

    let start: u64 = start.trim().parse().map_err(|_| malformed())?;
    let end: u64 = end.trim().parse().map_err(|_| malformed())?;
    let total: i64 = total.trim().parse().map_err(|_| malformed())?;
    if start > end || total <= end as i64 {
        return Err(malformed());
    }
    Ok((start, end, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-2/30").unwrap(), (0, 2, 30));
        assert_eq!(parse_content_range(" bytes 5-9/10 ").unwrap(), (5, 9, 10));
    }

    #[test]
    fn test_parse_content_range_rejects_garbage() {
        for value in ["0-2/30", "bytes 0-2", "bytes 3-2/30", "bytes 0-2/*", "bytes 0-30/30", "bytes a-b/c"] {
            assert!(
                matches!(parse_content_range(value), Err(LibraryError::MalformedHeader { .. })),
                "accepted {value:?}"
            );
        }
    }

    #[test]
    fn test_same_origin() {
        let legacy = LegacyClient::new(ClientConfig::new("https://library.example"), Logger::new_quiet()).unwrap();
        assert!(legacy.is_same_origin(&Url::parse("https://library.example/v1/imagefile/x").unwrap()));
        assert!(legacy.is_same_origin(&Url::parse("https://library.example:443/a").unwrap()));
        assert!(!legacy.is_same_origin(&Url::parse("http://library.example/a").unwrap()));
        assert!(!legacy.is_same_origin(&Url::parse("https://s3.example/a").unwrap()));
    }

    #[test]
    fn test_endpoint_join() {
        let legacy = LegacyClient::new(ClientConfig::new("https://library.example/"), Logger::new_quiet()).unwrap();
        assert_eq!(
            legacy.endpoint("/v2/imagefile/abc").unwrap().as_str(),
            "https://library.example/v2/imagefile/abc"
        );
    }
}
