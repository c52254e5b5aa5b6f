//! Reading raw objects behind (signed) asset hrefs.

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::io::Write;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{RemoteError, WorkflowError};
use crate::s3_operations::{S3Object, S3Storage};
use crate::signing::redact;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

pub trait ObjectRead {
    async fn head_object(&self, href: &str) -> Result<ObjectHead>;

    async fn get_object(&self, href: &str) -> Result<Vec<u8>>;

    /// Inclusive byte range, as in an HTTP `Range` header.
    async fn get_object_range(&self, href: &str, start_byte: u64, end_byte: u64)
        -> Result<Vec<u8>>;

    /// Streams an inclusive byte range into `out`, returning the bytes written.
    async fn write_range_to<W: Write>(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
        out: &mut W,
    ) -> Result<u64>;
}

/// Plain HTTP(S) object access.
#[derive(Clone)]
pub struct HttpStorage {
    client: Client,
}

impl HttpStorage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(config.http_client()?))
    }

    async fn send(&self, href: &str, range: Option<(u64, u64)>) -> Result<Response> {
        let mut request = self.client.get(href);
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={}-{}", start, end));
        }
        debug!(url = %redact(href), ?range, "GET object");
        let response = check_storage_response(request.send().await?).await?;

        // A 200 to a ranged request carries the object from its first byte.
        // That is only usable when the range also starts there.
        let status = response.status();
        if let Some((start, _)) = range {
            if start > 0 && status != StatusCode::PARTIAL_CONTENT {
                return Err(RemoteError::RangeIgnored {
                    url: redact(href),
                    status,
                }
                .into());
            }
        }
        Ok(response)
    }
}

impl ObjectRead for HttpStorage {
    async fn head_object(&self, href: &str) -> Result<ObjectHead> {
        let response = self.client.head(href).send().await?;
        let response = check_storage_response(response).await?;
        let headers = response.headers();
        Ok(ObjectHead {
            content_length: headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }

    async fn get_object(&self, href: &str) -> Result<Vec<u8>> {
        let response = self.send(href, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_object_range(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        let response = self.send(href, Some((start_byte, end_byte))).await?;
        let mut data = response.bytes().await?.to_vec();
        data.truncate(range_len(start_byte, end_byte) as usize);
        Ok(data)
    }

    async fn write_range_to<W: Write>(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
        out: &mut W,
    ) -> Result<u64> {
        let response = self.send(href, Some((start_byte, end_byte))).await?;
        let wanted = range_len(start_byte, end_byte);
        let mut stream = response.bytes_stream();
        let mut byte_count = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let take = (wanted - byte_count).min(chunk.len() as u64) as usize;
            out.write_all(&chunk[..take])?;
            byte_count += take as u64;
            if byte_count == wanted {
                break;
            }
        }
        Ok(byte_count)
    }
}

/// Number of bytes in the inclusive range `start..=end`.
fn range_len(start: u64, end: u64) -> u64 {
    end.saturating_sub(start) + 1
}

/// Turns a non-success storage response into [`RemoteError::Storage`], reading
/// the error code and message from the service's XML error document.
async fn check_storage_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = redact(response.url().as_str());
    let body = response.text().await.unwrap_or_default();
    Err(storage_error(url, status, &body).into())
}

pub(crate) fn storage_error(url: String, status: StatusCode, body: &str) -> RemoteError {
    let (code, message) = parse_error_document(body).unwrap_or_else(|| {
        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        (reason, body.trim().to_string())
    });
    RemoteError::Storage {
        url,
        status,
        code,
        message,
    }
}

/// `<Error><Code>..</Code><Message>..</Message></Error>`, as returned by both
/// Azure Blob Storage and S3.
fn parse_error_document(body: &str) -> Option<(String, String)> {
    let body = body.trim_start_matches('\u{feff}').trim();
    let doc = roxmltree::Document::parse(body).ok()?;
    let error = doc
        .descendants()
        .find(|n| n.has_tag_name("Error"))?;
    let text_of = |tag: &str| {
        error
            .children()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
    };
    let code = text_of("Code")?;
    let message = text_of("Message").unwrap_or_default();
    Some((code, message))
}

/// Routes `s3://` hrefs to S3 and everything else to HTTP. Virtual-hosted
/// `https://{bucket}.s3.{region}.amazonaws.com/...` hrefs also go through S3
/// when it is configured, and are otherwise read as public HTTP objects.
#[derive(Clone)]
pub struct Storage {
    http: HttpStorage,
    s3: Option<S3Storage>,
}

impl Storage {
    pub fn new(http: HttpStorage) -> Self {
        Self { http, s3: None }
    }

    pub fn with_s3(mut self, s3: S3Storage) -> Self {
        self.s3 = Some(s3);
        self
    }

    /// HTTP storage, plus S3 when a region or profile is configured.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let storage = Self::new(HttpStorage::from_config(config)?);
        let s3 = match (&config.s3_profile, &config.s3_region) {
            (Some(profile), region) => {
                Some(S3Storage::from_profile(profile, region.as_deref()).await)
            }
            (None, Some(region)) => Some(S3Storage::as_anon(Some(region)).await),
            (None, None) => None,
        };
        Ok(match s3 {
            Some(s3) => storage.with_s3(s3),
            None => storage,
        })
    }

    fn s3_for(&self, href: &str) -> Result<Option<&S3Storage>> {
        if !href.starts_with("s3://") {
            // A query string means the href is presigned and must go as is
            let virtual_hosted = !href.contains('?') && S3Object::from_url(href).is_ok();
            return Ok(self.s3.as_ref().filter(|_| virtual_hosted));
        }
        match &self.s3 {
            Some(s3) => Ok(Some(s3)),
            None => Err(WorkflowError::InvalidHref(format!(
                "{href} (no S3 region or profile configured)"
            ))
            .into()),
        }
    }
}

impl ObjectRead for Storage {
    async fn head_object(&self, href: &str) -> Result<ObjectHead> {
        match self.s3_for(href)? {
            Some(s3) => s3.head_object(href).await,
            None => self.http.head_object(href).await,
        }
    }

    async fn get_object(&self, href: &str) -> Result<Vec<u8>> {
        match self.s3_for(href)? {
            Some(s3) => s3.get_object(href).await,
            None => self.http.get_object(href).await,
        }
    }

    async fn get_object_range(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        match self.s3_for(href)? {
            Some(s3) => s3.get_object_range(href, start_byte, end_byte).await,
            None => self.http.get_object_range(href, start_byte, end_byte).await,
        }
    }

    async fn write_range_to<W: Write>(
        &self,
        href: &str,
        start_byte: u64,
        end_byte: u64,
        out: &mut W,
    ) -> Result<u64> {
        match self.s3_for(href)? {
            Some(s3) => s3.write_range_to(href, start_byte, end_byte, out).await,
            None => {
                self.http
                    .write_range_to(href, start_byte, end_byte, out)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_azure_error_document() {
        let body = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthenticationFailed</Code><Message>Server failed to authenticate the request.\nRequestId:1f7c</Message></Error>";
        let error = storage_error(
            "https://a1.blob.core.windows.net/c/B04.tif".into(),
            StatusCode::FORBIDDEN,
            body,
        );
        match &error {
            RemoteError::Storage { code, message, .. } => {
                assert_eq!(code, "AuthenticationFailed");
                assert!(message.starts_with("Server failed to authenticate"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(error.is_access_denied());
    }

    #[test]
    fn test_parse_s3_error_document() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessDenied</Code><Message>Access Denied</Message><RequestId>X</RequestId></Error>"#;
        let (code, message) = parse_error_document(body).unwrap();
        assert_eq!(code, "AccessDenied");
        assert_eq!(message, "Access Denied");
    }

    #[test]
    fn test_non_xml_error_body_keeps_status_reason() {
        let error = storage_error(
            "https://example.com/missing.tif".into(),
            StatusCode::NOT_FOUND,
            "no such object",
        );
        match error {
            RemoteError::Storage {
                code,
                message,
                status,
                ..
            } => {
                assert_eq!(code, "Not Found");
                assert_eq!(message, "no such object");
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_s3_href_without_s3_backend_is_refused() {
        let storage = Storage::new(HttpStorage::new(Client::new()));
        let err = storage
            .get_object("s3://sentinel-cogs/sentinel-s2-l2a-cogs/B04.tif")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<WorkflowError>().is_some());
    }

    #[test]
    fn test_virtual_hosted_s3_hrefs_use_s3_when_configured() {
        let href = "https://sentinel-cogs.s3.us-west-2.amazonaws.com/sentinel-s2-l2a-cogs/B04.tif";
        let http_only = Storage::new(HttpStorage::new(Client::new()));
        assert!(http_only.s3_for(href).unwrap().is_none());

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-west-2"))
            .build();
        let storage = Storage::new(HttpStorage::new(Client::new()))
            .with_s3(S3Storage::new(aws_sdk_s3::Client::from_conf(config)));
        assert!(storage.s3_for(href).unwrap().is_some());
        assert!(storage.s3_for("s3://sentinel-cogs/B04.tif").unwrap().is_some());
        assert!(storage
            .s3_for(&format!("{href}?X-Amz-Signature=abc"))
            .unwrap()
            .is_none());
        assert!(storage
            .s3_for("https://a1.blob.core.windows.net/c/B04.tif")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_range_length_is_inclusive() {
        assert_eq!(range_len(0, 15), 16);
        assert_eq!(range_len(6, 15), 10);
        assert_eq!(range_len(3, 3), 1);
    }
}
