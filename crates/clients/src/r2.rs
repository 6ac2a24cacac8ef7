use anyhow::{anyhow, Result};
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Credentials, Region},
    primitives::ByteStream,
    Client as S3Client,
};

use crowdnest_common::{define_module_client, env_or, ModuleClient};
use crowdnest_platform::storage::validate_relative_path;
use crowdnest_platform::FileStorage;

/// An S3 client bound to one bucket.
pub struct R2Bucket {
    pub s3: S3Client,
    pub bucket: String,
    pub public_domain: String,
}

define_module_client! {
    (struct R2Client, "r2")
    client_type: R2Bucket,
    env: ["R2_ACCOUNT_ID", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY", "R2_BUCKET_NAME"],
    setup: async {
        let account_id = std::env::var("R2_ACCOUNT_ID")?;
        let access_key_id = std::env::var("R2_ACCESS_KEY_ID")?;
        let secret_access_key = std::env::var("R2_SECRET_ACCESS_KEY")?;
        let bucket = std::env::var("R2_BUCKET_NAME")?;
        let public_domain = env_or("R2_PUBLIC_DOMAIN", &format!("{}.r2.dev", bucket));

        let endpoint_url = format!("https://{}.r2.cloudflarestorage.com", account_id);

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "r2-client"
        );

        let s3_config = S3ConfigBuilder::new()
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .behavior_version_latest()
            .build();

        Ok::<_, anyhow::Error>(R2Bucket {
            s3: S3Client::from_conf(s3_config),
            bucket,
            public_domain,
        })
    }
}

pub(crate) fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait::async_trait]
impl FileStorage for R2Client {
    async fn upload_file(&self, bytes: Vec<u8>, relative_path: &str) -> Result<String> {
        validate_relative_path(relative_path)?;
        let key = relative_path.trim_start_matches("./").replace('\\', "/");
        let bucket = self.get_client();

        bucket.s3
            .put_object()
            .bucket(&bucket.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type_for(&key))
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload {} to R2: {}", key, e))?;

        tracing::info!("[R2Client::upload_file] stored {}", key);
        Ok(key)
    }

    fn public_url(&self, reference: &str) -> String {
        let bucket = self.get_client();
        format!("https://{}/{}/{}", bucket.public_domain, bucket.bucket, reference)
    }
}
