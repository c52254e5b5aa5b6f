use anyhow::{anyhow, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::Client;
use regex::Regex;
use std::io::Write;
use tracing::debug;

use crate::storage::{ObjectHead, ObjectRead};

const DEFAULT_REGION: &str = "us-west-2";

#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Accepts `s3://bucket/key` and virtual-hosted
    /// `https://bucket.s3.region.amazonaws.com/key` hrefs.
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("s3://") {
            let (bucket, key) = path
                .split_once('/')
                .filter(|(b, k)| !b.is_empty() && !k.is_empty())
                .ok_or(anyhow!("No bucket and key found in: {}", url))?;
            return Ok(Self {
                region: None,
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let re = Regex::new(
            r"https:\/\/(?<bucket>[\d\w.-]+)\.s3\.(?<region>[\d\w-]+)\.amazonaws.com\/(?<key>[^?]+)",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;

        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: Some(region.to_string()),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// The region named in a virtual-hosted href, which may differ from the
    /// one the client was built for.
    pub fn region_override(&self) -> Option<S3ConfigBuilder> {
        let region = Region::new(self.region.clone()?);
        Some(S3ConfigBuilder::default().region(region))
    }
}

/// Object access through the AWS SDK.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Credentials from a named AWS profile; path-style addressing.
    pub async fn from_profile(profile_name: &str, region: Option<&str>) -> Self {
        let base_config = aws_config::from_env()
            .profile_name(profile_name)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&base_config)
            .region(region_or_default(region))
            .force_path_style(true)
            .build();
        Self::new(Client::from_conf(s3_config))
    }

    /// Unsigned requests, for public buckets such as the Earth Search COGs.
    pub async fn as_anon(region: Option<&str>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .no_credentials()
            .region(region_or_default(region))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

fn region_or_default(region: Option<&str>) -> Region {
    Region::new(region.unwrap_or(DEFAULT_REGION).to_string())
}

impl ObjectRead for S3Storage {
    async fn head_object(&self, href: &str) -> Result<ObjectHead> {
        let object = S3Object::from_url(href)?;
        let request = self.client.head_object().bucket(&object.bucket).key(&object.key);
        let mut request = request.customize();
        if let Some(config) = object.region_override() {
            request = request.config_override(config);
        }
        let head = request.send().await?;
        Ok(ObjectHead {
            content_length: head.content_length().map(|l| l as u64),
            content_type: head.content_type().map(str::to_string),
        })
    }

    async fn get_object(&self, href: &str) -> Result<Vec<u8>> {
        let object = S3Object::from_url(href)?;
        debug!(bucket = %object.bucket, key = %object.key, region = ?object.region, "GetObject");
        let request = self.client.get_object().bucket(&object.bucket).key(&object.key);
        let mut request = request.customize();
        if let Some(config) = object.region_override() {
            request = request.config_override(config);
        }
        let output = request.send().await?;
        let data = output.body.collect().await?.to_vec();
        Ok(data)
    }

    async fn get_object_range(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        let object = S3Object::from_url(href)?;
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let request = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .range(range);
        let mut request = request.customize();
        if let Some(config) = object.region_override() {
            request = request.config_override(config);
        }
        let output = request.send().await?;
        let data = output.body.collect().await?.to_vec();
        Ok(data)
    }

    async fn write_range_to<W: Write>(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
        out: &mut W,
    ) -> Result<u64> {
        let object = S3Object::from_url(href)?;
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let request = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .range(range);
        let mut request = request.customize();
        if let Some(config) = object.region_override() {
            request = request.config_override(config);
        }
        let mut response = request.send().await?;

        let mut byte_count = 0_u64;
        while let Some(bytes) = response.body.try_next().await? {
            out.write_all(&bytes)?;
            byte_count += bytes.len() as u64;
        }
        Ok(byte_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_object_from_url() {
        let url = "https://e84-earth-search-sentinel-data.s3.us-west-2.amazonaws.com/sentinel-2-c1-l2a/7/V/DG/2024/5/S2A_T07VDG_20240529T205023_L2A/B08.tif";
        let object = S3Object::from_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "e84-earth-search-sentinel-data".to_string(),
                region: Some("us-west-2".to_string()),
                key: "sentinel-2-c1-l2a/7/V/DG/2024/5/S2A_T07VDG_20240529T205023_L2A/B08.tif"
                    .to_string()
            }
        );
    }

    #[test]
    fn test_s3_object_from_s3_uri() {
        let object = S3Object::from_url("s3://sentinel-cogs/sentinel-s2-l2a-cogs/10/T/ET/B04.tif")
            .unwrap();
        assert_eq!(object.bucket, "sentinel-cogs");
        assert_eq!(object.key, "sentinel-s2-l2a-cogs/10/T/ET/B04.tif");
        assert!(object.region.is_none());
        assert!(object.region_override().is_none());
    }

    #[test]
    fn test_virtual_hosted_href_overrides_region() {
        let object =
            S3Object::from_url("https://sentinel-cogs.s3.eu-central-1.amazonaws.com/tiles/B04.tif")
                .unwrap();
        let config = object.region_override().unwrap().build();
        assert_eq!(config.region(), Some(&Region::new("eu-central-1")));
    }

    #[test]
    fn test_s3_object_rejects_other_urls() {
        assert!(S3Object::from_url("s3://bucket-only").is_err());
        assert!(S3Object::from_url("https://a1.blob.core.windows.net/c/B04.tif").is_err());
    }
}
