use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::error::Error;
use std::path::Path;
use tracing::info;

/// S3Adapter publishes videos to an S3-compatible bucket (DigitalOcean Spaces).
#[derive(Clone)]
pub struct S3Adapter {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3Adapter {
    pub fn new(client: Client, bucket: String, public_base: String) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Client for `https://<region>.digitaloceanspaces.com` with static credentials.
    pub async fn for_spaces(key: &str, secret: &str, region: &str, bucket: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(format!("https://{}.digitaloceanspaces.com", region))
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(key, secret, None, None, "do-spaces"))
            .load()
            .await;
        Self::new(
            Client::new(&config),
            bucket.to_string(),
            format!("https://{}.{}.digitaloceanspaces.com", bucket, region),
        )
    }
}

fn content_type(local_path: &Path) -> &'static str {
    match local_path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("json") => "application/json",
        Some("md") | Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl StoragePort for S3Adapter {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let byte_stream = ByteStream::from_path(local_path).await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type(local_path))
            .body(byte_stream)
            .send()
            .await?;
        info!(bucket = %self.bucket, key, "uploaded object");
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }
}
