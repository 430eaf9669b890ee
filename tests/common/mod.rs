#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use httpmock::Method::{GET, HEAD};
use httpmock::MockServer;
use serde_json::json;
use sif_library_client::client::{EntityKind, MetadataStore};
use sif_library_client::concurrency::TransferSpec;
use sif_library_client::config::ClientConfig;
use sif_library_client::digest::Digest;
use sif_library_client::error::Result;
use sif_library_client::image::sif::{HEADER_SIZE, SIF_MAGIC};
use sif_library_client::logging::Logger;
use sif_library_client::{LibraryClient, LibraryClientBuilder};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn config_for(server: &MockServer, spec: TransferSpec) -> ClientConfig {
    ClientConfig::new(server.base_url())
        .with_auth_token(Some("library-token".to_string()))
        .with_download(spec)
        .with_timeout(10)
}

pub fn client_for(config: ClientConfig) -> LibraryClient {
    LibraryClientBuilder::new(config)
        .with_output(Logger::new_quiet())
        .build()
        .unwrap()
}

/// A SIF file with no descriptors: header for `arch_code`, then `payload` filler bytes
pub fn sif_image(arch_code: &str, payload: usize) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE];
    buf[32..42].copy_from_slice(SIF_MAGIC);
    buf[42..44].copy_from_slice(b"01");
    buf[45..47].copy_from_slice(arch_code.as_bytes());
    buf[96..104].copy_from_slice(&(HEADER_SIZE as i64).to_le_bytes());
    buf.extend((0..payload).map(|i| b'a' + (i % 26) as u8));
    buf
}

pub async fn mount_redirect(server: &MockServer, namespace: &str, name: &str) {
    let url = server.base_url();
    let namespace = namespace.to_string();
    let name = name.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/oci/redirect")
                .query_param("namespace", namespace);
            then.status(200)
                .json_body(json!({ "url": url, "token": "registry-token", "name": name }));
        })
        .await;
}

pub async fn mount_manifest(server: &MockServer, name: &str, reference: &str, media_type: &str, body: &[u8]) {
    let path = format!("/v2/{}/manifests/{}", name, reference);
    let digest = Digest::sha256_of(body).to_string();
    let media_type = media_type.to_string();
    let body = body.to_vec();
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(200)
                .header("content-type", media_type)
                .header("docker-content-digest", digest)
                .body(body);
        })
        .await;
}

/// Serve `data` as a whole blob, without range support
pub async fn mount_blob(server: &MockServer, name: &str, digest: &Digest, data: &[u8]) {
    let path = format!("/v2/{}/blobs/{}", name, digest);
    let data = data.to_vec();
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(data);
        })
        .await;
}

/// Serve `data` under `path` as 206 responses for every `part_size` range
pub async fn mount_ranges(server: &MockServer, path: &str, data: &[u8], part_size: usize) {
    for (i, chunk) in data.chunks(part_size).enumerate() {
        let start = i * part_size;
        let end = start + chunk.len() - 1;
        let path = path.to_string();
        let chunk = chunk.to_vec();
        let total = data.len();
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(path)
                    .header("range", format!("bytes={}-{}", start, end));
                then.status(206)
                    .header("content-range", format!("bytes {}-{}/{}", start, end, total))
                    .body(chunk);
            })
            .await;
    }
}

pub async fn mount_blob_exists(server: &MockServer, name: &str, digest: &Digest) {
    let path = format!("/v2/{}/blobs/{}", name, digest);
    let digest = digest.to_string();
    server
        .mock_async(|when, then| {
            when.method(HEAD).path(path);
            then.status(200).header("docker-content-digest", digest);
        })
        .await;
}

/// In-memory metadata service; ids are handed out in creation order starting at 1
#[derive(Default)]
pub struct FakeMetadata {
    records: Mutex<HashMap<(EntityKind, String), String>>,
    pub tags: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl FakeMetadata {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn id_of(&self, kind: EntityKind, path: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(kind, path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl MetadataStore for FakeMetadata {
    async fn get_or_create(&self, kind: EntityKind, path: &str) -> Result<(String, bool)> {
        let mut records = self.records.lock().unwrap();
        if let Some(id) = records.get(&(kind, path.to_string())) {
            return Ok((id.clone(), true));
        }
        let id = (records.len() + 1).to_string();
        records.insert((kind, path.to_string()), id.clone());
        Ok((id, false))
    }

    async fn set_tags(&self, container_id: &str, image_id: &str, tags: &[String]) -> Result<()> {
        self.tags
            .lock()
            .unwrap()
            .push((container_id.to_string(), image_id.to_string(), tags.to_vec()));
        Ok(())
    }
}
