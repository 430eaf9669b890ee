mod common;

use common::{can_bind_localhost, config_for};
use httpmock::Method::{GET, PATCH};
use httpmock::MockServer;
use serde_json::json;
use sif_library_client::concurrency::TransferSpec;
use sif_library_client::error::LibraryError;
use sif_library_client::logging::Logger;
use sif_library_client::registry::{AccessType, Credential, RegistryClient};

fn registry_for(server: &MockServer) -> RegistryClient {
    RegistryClient::builder(config_for(server, TransferSpec::default()))
        .with_output(Logger::new_quiet())
        .build()
        .unwrap()
}

#[tokio::test]
async fn bearer_challenge_is_exchanged_for_a_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let challenge = format!(
        r#"Bearer realm="{}/token",service="registry",scope="repository:alice/tools/busybox:pull""#,
        server.base_url()
    );

    let rejected = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/alice/tools/busybox/manifests/latest")
                .header("authorization", "none");
            then.status(401).header("www-authenticate", challenge);
        })
        .await;
    let token = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/token")
                .query_param("service", "registry")
                .query_param("scope", "repository:alice/tools/busybox:pull");
            then.status(200).json_body(json!({ "access_token": "fresh-token" }));
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/alice/tools/busybox/manifests/latest")
                .header("authorization", "Bearer fresh-token");
            then.status(200).body("{}");
        })
        .await;

    let registry = registry_for(&server);
    let request = reqwest::Client::new()
        .get(format!("{}/v2/alice/tools/busybox/manifests/latest", server.base_url()))
        .build()
        .unwrap();
    let authorized = registry.do_request(request, None).await.unwrap();

    assert_eq!(authorized.response.status(), 200);
    assert_eq!(authorized.credential(), Some(Credential::bearer("fresh-token")));
    rejected.assert_async().await;
    token.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn second_rejection_is_unauthorized() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let rejected = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/private/manifests/latest");
            then.status(401).header("www-authenticate", r#"Basic realm="registry""#);
        })
        .await;

    let registry = registry_for(&server);
    let request = reqwest::Client::new()
        .get(format!("{}/v2/private/manifests/latest", server.base_url()))
        .build()
        .unwrap();
    let err = registry
        .do_request(request, Some(&Credential::basic("alice", "wrong")))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::Unauthorized(_)), "got {err:?}");
    rejected.assert_hits_async(2).await;
}

#[tokio::test]
async fn unknown_challenge_scheme_is_rejected() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/x/manifests/latest");
            then.status(401).header("www-authenticate", r#"Digest realm="x""#);
        })
        .await;

    let registry = registry_for(&server);
    let request = reqwest::Client::new()
        .get(format!("{}/v2/x/manifests/latest", server.base_url()))
        .build()
        .unwrap();
    let err = registry.do_request(request, None).await.unwrap_err();
    assert!(matches!(err, LibraryError::UnknownAuthType(ref s) if s == "Digest"));
}

#[tokio::test]
async fn challenge_on_streaming_body_cannot_be_retried() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let rejected = server
        .mock_async(|when, then| {
            when.method(PATCH).path("/v2/alice/tools/busybox/blobs/uploads/session-1");
            then.status(401).header(
                "www-authenticate",
                r#"Bearer realm="http://unused/token",service="registry""#,
            );
        })
        .await;

    let chunks = futures::stream::iter(vec![
        Ok::<Vec<u8>, std::io::Error>(b"first ".to_vec()),
        Ok(b"second".to_vec()),
    ]);
    let registry = registry_for(&server);
    let request = reqwest::Client::new()
        .patch(format!(
            "{}/v2/alice/tools/busybox/blobs/uploads/session-1",
            server.base_url()
        ))
        .body(reqwest::Body::wrap_stream(chunks))
        .build()
        .unwrap();
    let err = registry.do_request(request, None).await.unwrap_err();

    assert!(matches!(err, LibraryError::UnableToResetBody), "got {err:?}");
    rejected.assert_hits_async(1).await;
}

#[tokio::test]
async fn redirect_endpoint_grants_access_under_canonical_name() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let registry_url = format!("{}/", server.base_url());
    let redirect = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/oci/redirect")
                .query_param("namespace", "alpine")
                .query_param("accessTypes", "push,pull")
                .header("authorization", "Bearer library-token");
            then.status(200).json_body(json!({
                "url": registry_url,
                "token": "registry-token",
                "name": "library/default/alpine"
            }));
        })
        .await;

    let registry = registry_for(&server);
    let access = registry
        .authenticate("alpine", &[AccessType::Push, AccessType::Pull])
        .await
        .unwrap();

    redirect.assert_async().await;
    assert_eq!(access.name, "library/default/alpine");
    assert_eq!(access.registry_url, server.base_url());
    assert_eq!(access.credential, Credential::bearer("registry-token"));
    assert_eq!(
        access.manifest_url("latest"),
        format!("{}/v2/library/default/alpine/manifests/latest", server.base_url())
    );
}

#[tokio::test]
async fn redirect_endpoint_failure_means_oci_unsupported() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/oci/redirect");
            then.status(404);
        })
        .await;

    let registry = registry_for(&server);
    let err = registry
        .authenticate("alice/tools/busybox", &[AccessType::Pull])
        .await
        .unwrap_err();
    assert!(err.is_fallback(), "got {err:?}");
}
