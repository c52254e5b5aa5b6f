//! Acquiring access to blob storage.
//!
//! Signing is a separate step from reading: a [`HrefSigner`] turns a raw asset
//! href into a [`SignedHref`] that carries its own expiry, and the storage
//! layer only ever sees the signed result. Nothing is cached, so every call
//! asks the token service again.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use stac::{Asset, Item};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::stac_operations::read_json;

const BLOB_DOMAIN: &str = ".blob.core.windows.net";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// A SAS token for one storage container, as issued by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SasToken {
    #[serde(rename = "msft:expiry")]
    pub expiry: DateTime<Utc>,
    pub token: String,
}

impl SasToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Appends the token to `href` as (part of) its query string.
    pub fn apply(&self, href: &str) -> String {
        let token = self.token.trim_start_matches('?');
        if href.contains('?') {
            format!("{href}&{token}")
        } else {
            format!("{href}?{token}")
        }
    }
}

/// An href ready to be read. `expiry` is `None` when the href needed no
/// credential in the first place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHref {
    pub href: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl SignedHref {
    pub fn unsigned(href: &str) -> Self {
        Self {
            href: href.to_string(),
            expiry: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|e| now >= e).unwrap_or(false)
    }

    /// The href with its query string removed, safe to log.
    pub fn redacted(&self) -> String {
        redact(&self.href)
    }
}

pub(crate) fn redact(href: &str) -> String {
    href.split('?').next().unwrap_or(href).to_string()
}

pub trait HrefSigner {
    async fn sign_href(&self, href: &str) -> Result<SignedHref>;
}

/// For catalogs whose assets are publicly readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigning;

impl HrefSigner for NoSigning {
    async fn sign_href(&self, href: &str) -> Result<SignedHref> {
        Ok(SignedHref::unsigned(href))
    }
}

/// Where an href points inside blob storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub account: String,
    pub container: String,
    pub path: String,
}

impl BlobLocation {
    /// Recognises `https://{account}.blob.core.windows.net/{container}/{path}`
    /// and, when `emulator` names its `host:port`, the emulator form
    /// `http://{emulator}/{account}/{container}/{path}`. Returns `None` for
    /// anything else.
    pub fn from_href(href: &str, emulator: Option<&str>) -> Option<Self> {
        let url = Url::parse(href).ok()?;
        let host = url.host_str()?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        let account = if let Some(account) = host.strip_suffix(BLOB_DOMAIN) {
            account.to_string()
        } else if emulator.is_some_and(|e| e == authority(&url, host)) {
            segments.next()?.to_string()
        } else {
            return None;
        };
        let container = segments.next()?.to_string();
        let path = segments.collect::<Vec<_>>().join("/");

        let re = Regex::new(r"^[a-z0-9]{3,24}$").expect("Regex pattern should always compile");
        if !re.is_match(&account) {
            return None;
        }

        Some(Self {
            account,
            container,
            path,
        })
    }
}

fn authority(url: &Url, host: &str) -> String {
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Signs blob-storage hrefs with tokens from a Planetary Computer style
/// token endpoint.
pub struct SasSigner {
    client: Client,
    sas_url: String,
    subscription_key: Option<String>,
    blob_emulator: Option<String>,
}

impl SasSigner {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            sas_url: config.sas_url.trim_end_matches('/').to_string(),
            subscription_key: config.subscription_key.clone(),
            blob_emulator: config.blob_emulator.clone(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.subscription_key.is_some()
    }

    /// Requests a fresh token for one container.
    pub async fn token(&self, account: &str, container: &str) -> Result<SasToken> {
        let url = format!("{}/token/{}/{}", self.sas_url, account, container);
        debug!(%url, authenticated = self.is_authenticated(), "requesting SAS token");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.subscription_key {
            request = request.header(SUBSCRIPTION_KEY_HEADER, key);
        }
        let response = request.send().await?;
        let token: SasToken = read_json(response).await?;
        debug!(%account, %container, expiry = %token.expiry, "SAS token issued");
        Ok(token)
    }
}

impl HrefSigner for SasSigner {
    async fn sign_href(&self, href: &str) -> Result<SignedHref> {
        let Some(location) = BlobLocation::from_href(href, self.blob_emulator.as_deref()) else {
            return Ok(SignedHref::unsigned(href));
        };
        let token = self.token(&location.account, &location.container).await?;
        Ok(SignedHref {
            href: token.apply(href),
            expiry: Some(token.expiry),
        })
    }
}

/// A signer chosen at runtime, e.g. from the catalog a command points at.
pub enum Signer {
    Sas(SasSigner),
    Public(NoSigning),
}

impl HrefSigner for Signer {
    async fn sign_href(&self, href: &str) -> Result<SignedHref> {
        match self {
            Self::Sas(signer) => signer.sign_href(href).await,
            Self::Public(signer) => signer.sign_href(href).await,
        }
    }
}

/// A copy of `asset` whose href is signed.
pub async fn sign_asset(signer: &impl HrefSigner, asset: &Asset) -> Result<Asset> {
    let signed = signer.sign_href(&asset.href).await?;
    let mut asset = asset.clone();
    asset.href = signed.href;
    Ok(asset)
}

/// A copy of `item` with every asset href signed. The item's id, geometry and
/// properties are carried over untouched.
pub async fn sign_item(signer: &impl HrefSigner, item: &Item) -> Result<Item> {
    let mut signed = item.clone();
    for asset in signed.assets.values_mut() {
        asset.href = signer.sign_href(&asset.href).await?.href;
    }
    Ok(signed)
}
