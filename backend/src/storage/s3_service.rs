use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use url::Url;

use super::{Folder, StorageAdapter, StorageError, StoredObject, generate_object_key};
use crate::upload::extension_for;

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    region: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String, region: String) -> Self {
        Self {
            client,
            bucket_name,
            region,
        }
    }

    fn host(&self) -> String {
        object_host(&self.bucket_name, &self.region)
    }

    pub fn public_url(&self, s3_key: &str) -> String {
        public_url(&self.bucket_name, &self.region, s3_key)
    }

    pub fn key_from_url(&self, file_url: &str) -> Result<String, StorageError> {
        key_from_url(&self.host(), file_url)
    }

    pub async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn delete_image(&self, s3_key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for S3Service {
    async fn put(
        &self,
        bytes: &[u8],
        mime_type: &str,
        folder: Folder,
    ) -> Result<StoredObject, StorageError> {
        let key = generate_object_key(folder, extension_for(mime_type));
        self.upload_image(bytes, &key, mime_type).await?;
        log::debug!("Uploaded {} bytes to s3://{}/{}", bytes.len(), self.bucket_name, key);

        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete(&self, file_url: &str) {
        let key = match self.key_from_url(file_url) {
            Ok(key) => key,
            Err(e) => {
                log::error!("S3 delete error: {}", e);
                return;
            }
        };
        if let Err(e) = self.delete_image(&key).await {
            log::error!("S3 delete error for key {}: {}", key, e);
        }
    }

    fn name(&self) -> &str {
        "s3"
    }
}

fn object_host(bucket: &str, region: &str) -> String {
    format!("{}.s3.{}.amazonaws.com", bucket, region)
}

pub fn public_url(bucket: &str, region: &str, s3_key: &str) -> String {
    format!("https://{}/{}", object_host(bucket, region), s3_key)
}

/// Inverse of [`public_url`]; only accepts URLs pointing at `host`.
pub fn key_from_url(host: &str, file_url: &str) -> Result<String, StorageError> {
    let url = Url::parse(file_url).map_err(|_| StorageError::InvalidUrl(file_url.to_string()))?;
    if url.host_str() != Some(host) {
        return Err(StorageError::InvalidUrl(file_url.to_string()));
    }

    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        return Err(StorageError::InvalidUrl(file_url.to_string()));
    }
    let key = urlencoding::decode(path).map_err(|_| StorageError::InvalidUrl(file_url.to_string()))?;
    Ok(key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "agro-scans.s3.eu-west-1.amazonaws.com";

    #[test]
    fn public_url_has_the_virtual_hosted_shape() {
        assert_eq!(
            public_url("agro-scans", "eu-west-1", "scans/abc.png"),
            "https://agro-scans.s3.eu-west-1.amazonaws.com/scans/abc.png"
        );
    }

    #[test]
    fn key_parses_back_out_of_a_generated_url() {
        let key = generate_object_key(Folder::Scans, ".webp");
        let url = public_url("agro-scans", "eu-west-1", &key);
        assert_eq!(key_from_url(HOST, &url).unwrap(), key);
    }

    #[test]
    fn key_is_percent_decoded() {
        let url = format!("https://{}/profiles/a%20b.jpg", HOST);
        assert_eq!(key_from_url(HOST, &url).unwrap(), "profiles/a b.jpg");
    }

    #[test]
    fn foreign_or_malformed_urls_are_rejected() {
        assert!(key_from_url(HOST, "not a url").is_err());
        assert!(key_from_url(HOST, "https://other.s3.eu-west-1.amazonaws.com/scans/a.jpg").is_err());
        assert!(key_from_url(HOST, &format!("https://{}/", HOST)).is_err());
    }
}
