use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use mock_docker_registry::digest::sha256_digest;
use mock_docker_registry::{
    BlobStream, Reference, RegistryConfig, RegistryServer, RegistryStore, Result,
};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BUSYBOX_MANIFEST: &str = r#"{"schemaVersion":1}"#;

fn blob_digest(c: char) -> String {
    format!("sha256:{}", c.to_string().repeat(64))
}

fn seed_manifest(root: &Path, repo: &str, tag: &str, content: &str) {
    let dir = root.join("v2/repos").join(repo).join("manifests");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(tag), content).unwrap();
}

fn seed_blob(root: &Path, repo: &str, digest: &str, content: &[u8]) {
    let dir = root.join("v2/repos").join(repo).join("blobs");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(digest), content).unwrap();
}

async fn start(data: &TempDir) -> RegistryServer {
    let config = RegistryConfig::new(data.path()).with_port(0);
    RegistryServer::new(config).await.unwrap()
}

#[tokio::test]
async fn test_version_check() {
    let data = tempfile::tempdir().unwrap();
    let server = start(&data).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/v2/", server.url()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ping() {
    let data = tempfile::tempdir().unwrap();
    let server = start(&data).await;

    let response = reqwest::get(format!("{}/ping", server.url())).await.unwrap();

    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["ping"], "pong");
}

#[tokio::test]
async fn test_get_manifest() {
    let data = tempfile::tempdir().unwrap();
    seed_manifest(data.path(), "busybox", "latest", BUSYBOX_MANIFEST);
    let server = start(&data).await;

    let client = reqwest::Client::new();
    let url = format!("{}/v2/busybox/manifests/latest", server.url());

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers()["content-type"],
        "application/vnd.docker.distribution.manifest.v1+prettyjws"
    );
    let digest = first.headers()["docker-content-digest"].clone();
    assert_eq!(digest, sha256_digest(BUSYBOX_MANIFEST.as_bytes()).as_str());
    assert_eq!(first.text().await.unwrap(), BUSYBOX_MANIFEST);

    // Read-only store: a second fetch is identical.
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["docker-content-digest"], digest);
    assert_eq!(second.text().await.unwrap(), BUSYBOX_MANIFEST);
}

#[tokio::test]
async fn test_manifest_unknown() {
    let data = tempfile::tempdir().unwrap();
    seed_manifest(data.path(), "busybox", "latest", BUSYBOX_MANIFEST);
    let server = start(&data).await;

    let response = reqwest::get(format!("{}/v2/foo/manifests/missing-tag", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );
    let json: serde_json::Value = response.json().await.unwrap();
    let error = &json["errors"][0];
    assert_eq!(error["code"], "MANIFEST_UNKNOWN");
    assert_eq!(error["detail"]["Name"], "foo");
    assert_eq!(error["detail"]["Tag"], "missing-tag");
}

#[tokio::test]
async fn test_get_blob() {
    let data = tempfile::tempdir().unwrap();
    let digest = blob_digest('a');
    // Several read chunks worth of data, with a pattern so reordering shows.
    let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    seed_blob(data.path(), "busybox", &digest, &content);
    let server = start(&data).await;

    let client = reqwest::Client::new();
    let url = format!("{}/v2/busybox/blobs/{}", server.url(), digest);

    for _ in 0..2 {
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["docker-distribution-api-version"],
            "registry/2.0"
        );
        let body = response.bytes().await.unwrap();
        assert_eq!(body.len(), content.len());
        assert!(body[..] == content[..]);
    }
}

#[tokio::test]
async fn test_blob_not_found() {
    let data = tempfile::tempdir().unwrap();
    seed_blob(data.path(), "busybox", &blob_digest('a'), b"layer");
    let server = start(&data).await;

    let client = reqwest::Client::new();
    for (repo, digest) in [("busybox", blob_digest('b')), ("other", blob_digest('a'))] {
        let response = client
            .get(format!("{}/v2/{}/blobs/{}", server.url(), repo, digest))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        assert!(response.bytes().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_blob_invalid_digest() {
    let data = tempfile::tempdir().unwrap();
    let server = start(&data).await;

    let response = reqwest::get(format!("{}/v2/busybox/blobs/sha256:abc", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["errors"][0]["code"], "DIGEST_INVALID");
}

#[tokio::test]
async fn test_manifest_by_digest_unsupported() {
    let data = tempfile::tempdir().unwrap();
    seed_manifest(data.path(), "busybox", "latest", BUSYBOX_MANIFEST);
    let server = start(&data).await;

    let digest = sha256_digest(BUSYBOX_MANIFEST.as_bytes());
    let response = reqwest::get(format!("{}/v2/busybox/manifests/{}", server.url(), digest))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["errors"][0]["code"], "UNSUPPORTED");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let data = tempfile::tempdir().unwrap();
    let server = start(&data).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/v2/", server.url()))
        .header("request-id", "abc-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["request-id"], "abc-123");
}

/// Serves the first chunk of every blob, then reports the file gone.
struct TruncatingStore;

#[async_trait]
impl RegistryStore for TruncatingStore {
    async fn get_manifest(&self, _reference: &Reference) -> Result<Option<Bytes>> {
        Ok(None)
    }

    fn open_blob_stream(&self, _reference: &Reference) -> Result<BlobStream> {
        Ok(stream::iter(vec![
            Ok(Bytes::from(vec![1u8; 1024])),
            Err(io::Error::from(io::ErrorKind::NotFound)),
        ])
        .boxed())
    }
}

#[tokio::test]
async fn test_blob_lost_mid_transfer_aborts_response() {
    let config = RegistryConfig::new("unused").with_port(0);
    let server = RegistryServer::with_store(config, Arc::new(TruncatingStore))
        .await
        .unwrap();

    let url = format!("{}/v2/busybox/blobs/{}", server.url(), blob_digest('a'));
    let response = reqwest::get(url).await.unwrap();

    // Headers went out with the first chunk; the failure can only cut the body short.
    assert_eq!(response.status(), 200);
    assert!(response.bytes().await.is_err());
}

#[tokio::test]
async fn test_unrouted_v2_requests_carry_version_header() {
    let data = tempfile::tempdir().unwrap();
    seed_manifest(data.path(), "busybox", "latest", BUSYBOX_MANIFEST);
    let server = start(&data).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/v2/busybox/tags/list", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );

    let response = client
        .put(format!("{}/v2/busybox/manifests/latest", server.url()))
        .body(BUSYBOX_MANIFEST)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );
}
