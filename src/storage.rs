//! Flat-file registry store.
//!
//! The data directory is laid out as:
//!
//! ```text
//! $data_dir/v2/repos/$remote_name/manifests/$tag
//! $data_dir/v2/repos/$remote_name/blobs/$digest
//! ```
//!
//! Everything is seeded before the server starts; the store only reads.

use crate::error::{RegistryError, Result};
use crate::reference::{is_digest, Reference};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;

const CHUNK_SIZE: usize = 64 * 1024;

/// A lazily opened, sequential byte source for one blob.
pub type BlobStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Returns the manifest bytes for a tag-keyed reference, or `None` if no
    /// such manifest was seeded. The content is returned verbatim.
    async fn get_manifest(&self, reference: &Reference) -> Result<Option<Bytes>>;

    /// Returns a stream over the blob named by a digest-keyed reference.
    ///
    /// The digest is validated here, before any filesystem access. Whether
    /// the blob exists is only discovered once the stream is polled.
    fn open_blob_stream(&self, reference: &Reference) -> Result<BlobStream>;
}

/// [`RegistryStore`] over a directory of pre-seeded files.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    data_dir: PathBuf,
}

impl FlatFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn repo_path(&self, remote_name: &str) -> PathBuf {
        self.data_dir.join("v2").join("repos").join(remote_name)
    }

    fn manifest_path(&self, remote_name: &str, tag: &str) -> PathBuf {
        self.repo_path(remote_name).join("manifests").join(tag)
    }

    fn blob_path(&self, remote_name: &str, digest: &str) -> PathBuf {
        self.repo_path(remote_name).join("blobs").join(digest)
    }
}

#[async_trait]
impl RegistryStore for FlatFileStore {
    async fn get_manifest(&self, reference: &Reference) -> Result<Option<Bytes>> {
        if reference.digest.is_some() {
            return Err(RegistryError::UnsupportedOperation(
                "manifest lookup by digest",
            ));
        }
        let tag = reference
            .tag
            .as_deref()
            .ok_or_else(|| RegistryError::InvalidTag(String::new()))?;

        let path = self.manifest_path(&reference.remote_name, tag);
        match fs::read(&path).await {
            Ok(manifest) => Ok(Some(Bytes::from(manifest))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RegistryError::Storage {
                op: "read manifest",
                reference: reference.to_string(),
                source,
            }),
        }
    }

    fn open_blob_stream(&self, reference: &Reference) -> Result<BlobStream> {
        let digest = reference.digest.as_deref().unwrap_or_default();
        if !is_digest(digest) {
            return Err(RegistryError::InvalidDigest(digest.to_string()));
        }

        let path = self.blob_path(&reference.remote_name, digest);
        Ok(stream::once(fs::File::open(path))
            .map_ok(|file| ReaderStream::with_capacity(file, CHUNK_SIZE))
            .try_flatten()
            .boxed())
    }
}
