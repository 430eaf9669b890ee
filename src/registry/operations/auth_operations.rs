//! Authentication operations for registry access
//!
//! Two flows live here:
//! - the library service's redirect endpoint, which hands out a registry URL, a bearer token
//!   and the canonical repository name for a namespace
//! - [`AuthOperations::do_request`], which sends a registry request and, on a 401, negotiates
//!   credentials from the `WWW-Authenticate` challenge and retries exactly once

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{LibraryError, Result};
use crate::logging::Logger;
use crate::registry::auth::{AccessType, AuthChallenge, AuthScheme, Credential, TokenResponse};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Request, Response, StatusCode};
use serde::Deserialize;

/// Where and as whom to talk to the OCI registry for one namespace
#[derive(Debug, Clone)]
pub struct OciAccess {
    /// Registry base URL, without trailing slash
    pub registry_url: String,
    pub credential: Credential,
    /// Canonical repository name; short names may have been remapped by the service
    pub name: String,
}

impl OciAccess {
    pub fn new(registry_url: &str, credential: Credential, name: &str) -> Self {
        Self {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            credential,
            name: name.to_string(),
        }
    }

    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.registry_url, self.name, digest)
    }

    pub fn uploads_url(&self) -> String {
        format!("{}/v2/{}/blobs/uploads/", self.registry_url, self.name)
    }

    pub fn manifest_url(&self, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.registry_url, self.name, reference)
    }
}

#[derive(Debug, Deserialize)]
struct RedirectResponse {
    url: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    name: String,
}

/// A successful response together with the `Authorization` value that earned it
#[derive(Debug)]
pub struct AuthorizedResponse {
    pub response: Response,
    pub authorization: Option<String>,
}

impl AuthorizedResponse {
    /// Credential that was actually sent, if one can be recovered from the header
    pub fn credential(&self) -> Option<Credential> {
        self.authorization
            .as_deref()
            .and_then(Credential::from_authorization_header)
    }
}

#[derive(Clone)]
pub struct AuthOperations {
    client: Client,
    library_client: Client,
    base_url: String,
    auth_token: Option<String>,
    output: Logger,
}

impl AuthOperations {
    pub fn new(
        client: Client,
        library_client: Client,
        base_url: String,
        auth_token: Option<String>,
        output: Logger,
    ) -> Self {
        Self {
            client,
            library_client,
            base_url,
            auth_token,
            output,
        }
    }

    /// Ask the library service for OCI registry access to `namespace`
    ///
    /// Any non-200 answer means the namespace is not served over OCI and is reported as
    /// [`LibraryError::OciAccessUnsupported`].
    pub async fn authenticate(
        &self,
        namespace: &str,
        access_types: &[AccessType],
    ) -> Result<OciAccess> {
        let access = AccessType::join(access_types);
        self.output.verbose(&format!(
            "Requesting OCI registry access for {} ({})",
            namespace, access
        ));

        let url = format!("{}/v1/oci/redirect", self.base_url);
        let mut request = self
            .library_client
            .get(&url)
            .query(&[("namespace", namespace), ("accessTypes", access.as_str())]);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            self.output
                .warning(&NetworkErrorHandler::describe(&e, "OCI redirect request"));
            LibraryError::Network(e)
        })?;

        if response.status() != StatusCode::OK {
            self.output.detail(&format!(
                "OCI redirect endpoint answered {}, OCI access unavailable",
                response.status()
            ));
            return Err(LibraryError::OciAccessUnsupported);
        }

        let redirect: RedirectResponse = response.json().await?;
        let name = if redirect.name.is_empty() {
            namespace.to_string()
        } else {
            redirect.name
        };
        if name != namespace {
            self.output
                .detail(&format!("Namespace {} is served as {}", namespace, name));
        }
        self.output
            .detail(&format!("OCI registry endpoint: {}", redirect.url));

        Ok(OciAccess::new(
            &redirect.url,
            Credential::bearer(redirect.token),
            &name,
        ))
    }

    /// Send `request`, answering a single 401 challenge
    ///
    /// The retried request is a clone taken before the first send, so a streaming body fails
    /// with [`LibraryError::UnableToResetBody`] once a retry is needed.
    pub async fn do_request(
        &self,
        mut request: Request,
        credential: Option<&Credential>,
    ) -> Result<AuthorizedResponse> {
        if let Some(credential) = credential {
            credential.apply(&mut request)?;
        }
        let retry = request.try_clone();
        let method = request.method().clone();
        let url = request.url().to_string();
        let authorization = header_string(&request);

        self.output.detail(&format!("{} {}", method, url));
        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(AuthorizedResponse {
                response,
                authorization,
            });
        }
        if status != StatusCode::UNAUTHORIZED {
            return Err(HttpErrorHandler::from_response(response, &format!("{} {}", method, url)).await);
        }

        let mut retry = retry.ok_or(LibraryError::UnableToResetBody)?;
        let credential = credential.cloned().unwrap_or_default();

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .ok_or_else(|| {
                LibraryError::Unauthorized(format!(
                    "{} {} returned 401 without a challenge",
                    method, url
                ))
            })?
            .to_str()
            .map_err(|_| LibraryError::MalformedHeader {
                header: "WWW-Authenticate",
                value: "<non-ascii>".to_string(),
            })?
            .to_string();
        let challenge = AuthChallenge::parse(&header)?;
        self.output.detail(&format!(
            "Received {:?} challenge (realm {:?}, scope {:?})",
            challenge.scheme, challenge.realm, challenge.scope
        ));

        let negotiated = match challenge.scheme {
            AuthScheme::Bearer => Credential::bearer(self.request_token(&challenge, &credential).await?),
            AuthScheme::Basic => credential,
        };
        negotiated.apply(&mut retry)?;
        let authorization = header_string(&retry);

        let response = self.client.execute(retry).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(AuthorizedResponse {
                response,
                authorization,
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(LibraryError::Unauthorized(format!(
                "{} {} rejected negotiated credentials",
                method, url
            )));
        }
        Err(HttpErrorHandler::from_response(response, &format!("{} {}", method, url)).await)
    }

    /// Exchange `credential` for a bearer token at the challenge realm
    async fn request_token(&self, challenge: &AuthChallenge, credential: &Credential) -> Result<String> {
        if challenge.realm.is_empty() {
            return Err(LibraryError::Unauthorized(
                "bearer challenge has no realm".to_string(),
            ));
        }

        let mut query = Vec::new();
        if !challenge.service.is_empty() {
            query.push(("service", challenge.service.as_str()));
        }
        if !challenge.scope.is_empty() {
            query.push(("scope", challenge.scope.as_str()));
        }

        let mut request = self.client.get(&challenge.realm).query(&query).build()?;
        credential.apply(&mut request)?;

        self.output
            .detail(&format!("Requesting token from {}", challenge.realm));
        let response = self.client.execute(request).await?;
        if !response.status().is_success() {
            return Err(LibraryError::Unauthorized(format!(
                "token request to {} failed with status {}",
                challenge.realm,
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        token.into_token().ok_or_else(|| {
            LibraryError::Unauthorized(format!("no token returned by {}", challenge.realm))
        })
    }
}

fn header_string(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
