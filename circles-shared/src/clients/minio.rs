use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

/// Object storage holding post attachments. Posts reference objects by key.
#[derive(Clone)]
pub struct MinioClient {
    client: S3Client,
    bucket: String,
}

impl MinioClient {
    pub async fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(config);

        if let Err(e) = client.head_bucket().bucket(bucket).send().await {
            tracing::warn!(bucket = %bucket, error = %e, "media bucket not reachable");
        }

        tracing::info!(endpoint = %endpoint, bucket = %bucket, "MinIO client initialized");

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| format!("delete failed: {e}"))?;

        Ok(())
    }

    /// Deletes every key, logging failures. Returns how many were removed.
    pub async fn delete_all(&self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            match self.delete(key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(key = %key, error = %e, "failed to delete media object"),
            }
        }
        removed
    }
}
