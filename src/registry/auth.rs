//! Registry credentials and `WWW-Authenticate` challenge parsing

use crate::error::{LibraryError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use std::fmt;

/// Credential for a single registry interaction
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// Sent as the literal `Authorization: none`; some registries insist on an explicit header
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => write!(f, "None"),
            Credential::Basic { username, .. } => write!(f, "Basic({}:***)", username),
            Credential::Bearer { .. } => write!(f, "Bearer(***)"),
        }
    }
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer {
            token: token.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization_value(&self) -> String {
        match self {
            Credential::None => "none".to_string(),
            Credential::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
            }
            Credential::Bearer { token } => format!("Bearer {}", token),
        }
    }

    /// Set the `Authorization` header on `request`, replacing any existing one
    pub fn apply(&self, request: &mut Request) -> Result<()> {
        let value = HeaderValue::from_str(&self.authorization_value()).map_err(|_| {
            LibraryError::MalformedHeader {
                header: "Authorization",
                value: "<redacted>".to_string(),
            }
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Recover a credential from an `Authorization` header value that was sent
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("none") {
            return Some(Credential::None);
        }
        let (scheme, rest) = value.split_once(' ')?;
        let rest = rest.trim();
        if scheme.eq_ignore_ascii_case("bearer") {
            return Some(Credential::bearer(rest));
        }
        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD.decode(rest).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            return Some(Credential::basic(username, password));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

/// Parsed `WWW-Authenticate` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: AuthScheme,
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl AuthChallenge {
    /// Parse `<scheme> <key=value,...>`
    pub fn parse(header: &str) -> Result<Self> {
        let parts: Vec<&str> = header.splitn(2, ' ').collect();
        if parts.len() != 2 {
            return Err(LibraryError::InvalidAuthHeader(header.to_string()));
        }

        let scheme = if parts[0].eq_ignore_ascii_case("basic") {
            AuthScheme::Basic
        } else if parts[0].eq_ignore_ascii_case("bearer") {
            AuthScheme::Bearer
        } else {
            return Err(LibraryError::UnknownAuthType(parts[0].to_string()));
        };

        let mut challenge = AuthChallenge {
            scheme,
            realm: String::new(),
            service: String::new(),
            scope: String::new(),
        };

        for (key, value) in parse_params(parts[1]) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "service" => challenge.service = value,
                "scope" => challenge.scope = value,
                _ => {}
            }
        }

        Ok(challenge)
    }
}

/// Split an RFC 2068 parameter list; quoted values may contain commas and `\` escapes
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
                // skip anything between the closing quote and the next separator
                while chars.peek().is_some_and(|c| *c != ',') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim_end().to_string();
            }
        }

        let key = key.trim();
        if !key.is_empty() {
            params.push((key.to_string(), value));
        }
    }

    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Pull,
    Push,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Pull => "pull",
            AccessType::Push => "push",
        }
    }

    pub fn join(types: &[AccessType]) -> String {
        types
            .iter()
            .map(AccessType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Token endpoint response; registries use either field name
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token.filter(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = AuthChallenge::parse(
            "Bearer realm=\"https://auth\",service=\"reg\",scope=\"repo:pull\"",
        )
        .unwrap();
        assert_eq!(
            challenge,
            AuthChallenge {
                scheme: AuthScheme::Bearer,
                realm: "https://auth".into(),
                service: "reg".into(),
                scope: "repo:pull".into(),
            }
        );
    }

    #[test]
    fn test_parse_basic_challenge() {
        let challenge = AuthChallenge::parse("Basic realm=\"x\"").unwrap();
        assert_eq!(challenge.scheme, AuthScheme::Basic);
        assert_eq!(challenge.realm, "x");
        assert!(challenge.service.is_empty());
        assert!(challenge.scope.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_params() {
        assert!(matches!(
            AuthChallenge::parse("bogus"),
            Err(LibraryError::InvalidAuthHeader(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(matches!(
            AuthChallenge::parse("Digest realm=\"x\""),
            Err(LibraryError::UnknownAuthType(s)) if s == "Digest"
        ));
    }

    #[test]
    fn test_parse_scheme_and_keys_case_insensitive() {
        let challenge = AuthChallenge::parse("BEARER Realm=\"r\",SERVICE=s").unwrap();
        assert_eq!(challenge.scheme, AuthScheme::Bearer);
        assert_eq!(challenge.realm, "r");
        assert_eq!(challenge.service, "s");
    }

    #[test]
    fn test_parse_quoted_commas_and_escapes() {
        let challenge = AuthChallenge::parse(
            "Bearer realm=\"https://auth\", scope=\"repository:a/b:pull,push\", error=\"x\\\"y\"",
        )
        .unwrap();
        assert_eq!(challenge.scope, "repository:a/b:pull,push");
        assert_eq!(challenge.realm, "https://auth");

        let params = parse_params("a=\"x\\\"y\",b=plain");
        assert_eq!(
            params,
            vec![("a".into(), "x\"y".into()), ("b".into(), "plain".into())]
        );
    }

    #[test]
    fn test_authorization_values() {
        assert_eq!(Credential::None.authorization_value(), "none");
        assert_eq!(Credential::bearer("abc").authorization_value(), "Bearer abc");
        assert_eq!(
            Credential::basic("user", "pass").authorization_value(),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[test]
    fn test_credential_from_header_roundtrip() {
        for credential in [
            Credential::None,
            Credential::bearer("tok"),
            Credential::basic("u", "p:w"),
        ] {
            let parsed = Credential::from_authorization_header(&credential.authorization_value());
            assert_eq!(parsed, Some(credential));
        }
        assert_eq!(Credential::from_authorization_header("Digest x"), None);
    }

    #[test]
    fn test_apply_sets_header() {
        let mut request = Request::new(
            reqwest::Method::GET,
            "http://registry/v2/".parse().unwrap(),
        );
        Credential::bearer("t").apply(&mut request).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer t");
        Credential::None.apply(&mut request).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "none");
    }

    #[test]
    fn test_access_type_join() {
        assert_eq!(AccessType::join(&[AccessType::Push, AccessType::Pull]), "push,pull");
    }

    #[test]
    fn test_token_response_fields() {
        let r: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(r.into_token().as_deref(), Some("a"));
        let r: TokenResponse = serde_json::from_str(r#"{"token":"t","access_token":"a"}"#).unwrap();
        assert_eq!(r.into_token().as_deref(), Some("t"));
        let r: TokenResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(r.into_token(), None);
    }
}
