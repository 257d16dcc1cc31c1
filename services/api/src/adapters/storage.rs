//! services/api/src/adapters/storage.rs
//!
//! S3-backed implementation of the `StorageService` port. The rest of the
//! application treats stored blobs as opaque and only ever holds the key and
//! URL this adapter hands back.

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use signflow_core::domain::StoredFile;
use signflow_core::ports::{PortError, PortResult, StorageService};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// An adapter that implements `StorageService` against an S3 bucket.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Creates a new `S3Storage` for a specific bucket. Credentials and
    /// region come from the ambient AWS configuration.
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, key)
    }
}

#[async_trait]
impl StorageService for S3Storage {
    async fn put(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> PortResult<StoredFile> {
        // Prefix the key with a fresh UUID so distinct uploads of the same
        // file name never collide.
        let key = format!("documents/{}-{}", Uuid::new_v4(), file_name);
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| PortError::Dependency(format!("S3 upload failed: {}", e)))?;

        let url = self.object_url(&key);
        Ok(StoredFile { key, url })
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> PortResult<String> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
            .map_err(|e| PortError::Dependency(format!("invalid presign TTL: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| PortError::Dependency(format!("S3 presign failed: {}", e)))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PortError::Dependency(format!("S3 delete failed: {}", e)))?;
        Ok(())
    }
}
