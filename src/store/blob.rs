//! Durable blob storage behind the tenant vector store.
//!
//! Artifacts are addressed by deterministic tenant-scoped paths; the
//! store's write-then-publish discipline lives above this trait, so
//! implementations only need ordinary `put`/`get`.

use async_trait::async_trait;

use crate::error::{Result, ShortstackError};

/// Minimal blob storage interface.
///
/// `get` returns `Ok(None)` for a missing path: "tenant has no index
/// yet" is an expected state, not a storage failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Local-directory blob store. Used by tests and single-node deployments.
#[derive(Debug)]
pub struct FsBlobStore {
    root: std::path::PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<std::path::Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> Result<std::path::PathBuf> {
        if path.split('/').any(|seg| seg == "..") {
            return Err(ShortstackError::Storage(format!(
                "invalid blob path: {path}"
            )));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-temp-then-rename so a crashed put never leaves a torn blob.
        let tmp = full.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &full).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// S3-backed blob store (feature `s3-snapshots`).
#[cfg(feature = "s3-snapshots")]
pub struct S3BlobStore {
    bucket: Box<s3::Bucket>,
}

#[cfg(feature = "s3-snapshots")]
impl S3BlobStore {
    /// Credentials come from the standard AWS environment/profile chain.
    /// `endpoint` selects an S3-compatible service (MinIO, R2, …).
    ///
    /// # Errors
    ///
    /// Returns [`ShortstackError::Storage`] when the region or
    /// credentials cannot be resolved.
    pub fn new(bucket_name: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let region = match endpoint {
            Some(e) => s3::Region::Custom {
                region: region.to_owned(),
                endpoint: e.to_owned(),
            },
            None => region
                .parse()
                .map_err(|e| ShortstackError::Storage(format!("invalid S3 region: {e}")))?,
        };
        let credentials = s3::creds::Credentials::default()
            .map_err(|e| ShortstackError::Storage(format!("S3 credentials: {e}")))?;
        let bucket = s3::Bucket::new(bucket_name, region, credentials)
            .map_err(|e| ShortstackError::Storage(e.to_string()))?
            .with_path_style();
        Ok(Self { bucket })
    }
}

#[cfg(feature = "s3-snapshots")]
#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let resp = self
            .bucket
            .put_object(path, bytes)
            .await
            .map_err(|e| ShortstackError::Storage(e.to_string()))?;
        if resp.status_code() >= 300 {
            return Err(ShortstackError::Storage(format!(
                "S3 put {} returned {}",
                path,
                resp.status_code()
            )));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.bucket.get_object(path).await {
            Ok(resp) if resp.status_code() == 404 => Ok(None),
            Ok(resp) if resp.status_code() < 300 => Ok(Some(resp.bytes().to_vec())),
            Ok(resp) => Err(ShortstackError::Storage(format!(
                "S3 get {} returned {}",
                path,
                resp.status_code()
            ))),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(ShortstackError::Storage(e.to_string())),
        }
    }
}
