use std::{fs::read_to_string, path::Path};

use anyhow::{anyhow, Result};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stac::{Asset, Collection, Item, ItemCollection, Link, Links};
use stac_api::{Root, Search};
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{RemoteError, WorkflowError};
use crate::records::ItemSet;
use crate::search::SearchBuilder;

#[derive(Debug)]
pub struct AssetInfo {
    pub item_id: String,
    pub key: String,
    pub href: String,
    pub media_type: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<i64>,
}

impl AssetInfo {
    pub fn from_item(item: &Item, key: &str) -> Result<Self> {
        let asset = item
            .assets
            .get(key)
            .ok_or_else(|| WorkflowError::AssetNotFound {
                item: item.id.clone(),
                asset: key.to_string(),
            })?;
        Ok(Self {
            item_id: item.id.to_owned(),
            key: key.to_owned(),
            href: asset.href.to_owned(),
            media_type: asset.r#type.to_owned(),
            checksum: Self::extract_checksum(asset),
            size: Self::extract_file_size(asset),
        })
    }

    fn extract_checksum(asset: &Asset) -> Option<String> {
        let checksum = asset
            .additional_fields
            .get("file:checksum")?
            .as_str()?
            .to_owned();
        Some(checksum)
    }

    fn extract_file_size(asset: &Asset) -> Option<i64> {
        let size = asset.additional_fields.get("file:size")?.as_i64()?;
        Some(size)
    }
}

/// Total hits reported by the API for the search behind `page`. Older APIs
/// report it under `context.matched` instead of `numberMatched`.
pub fn matched(page: &ItemCollection) -> Option<u64> {
    let fields = &page.additional_fields;
    fields
        .get("numberMatched")
        .and_then(Value::as_u64)
        .or_else(|| fields.get("context")?.get("matched")?.as_u64())
}

/// An open handle on a STAC API. Holds nothing but the landing page and the
/// HTTP client; every call goes to the server.
pub struct Catalog {
    client: Client,
    root_url: Url,
    /// `root_url` with a trailing slash, so relative links such as
    /// `./search` resolve beneath the API rather than beside it.
    base_url: Url,
    root: Root,
    page_size: Option<u32>,
    max_items: Option<usize>,
}

impl Catalog {
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_with(url, &ClientConfig::default()).await
    }

    pub async fn open_with(url: &str, config: &ClientConfig) -> Result<Self> {
        let client = config.http_client()?;
        let root_url = Url::parse(url)?;
        info!(url = %root_url, "opening catalog");
        let response = client.get(root_url.clone()).send().await?;
        let root: Root = read_json(response).await?;
        debug!(id = %root.catalog.id, links = root.catalog.links.len(), "catalog root");
        Ok(Self {
            client,
            base_url: with_trailing_slash(&root_url),
            root_url,
            root,
            page_size: config.page_size,
            max_items: config.max_items,
        })
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The `search` link of the landing page, or `{root}/search` when the
    /// catalog does not advertise one.
    pub fn search_url(&self) -> Result<Url> {
        match self.root.catalog.link("search") {
            Some(link) => Ok(self.base_url.join(&link.href)?),
            None => self.endpoint(&["search"]),
        }
    }

    pub async fn collection(&self, id: &str) -> Result<Collection> {
        let url = self.endpoint(&["collections", id])?;
        debug!(%url, "fetching collection");
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    pub async fn item(&self, collection: &str, id: &str) -> Result<Item> {
        let url = self.endpoint(&["collections", collection, "items", id])?;
        debug!(%url, "fetching item");
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    /// One page of results.
    pub async fn search(&self, params: &Search) -> Result<ItemCollection> {
        let params = self.with_page_size(params);
        let url = self.search_url()?;
        debug!(%url, "search");
        let response = self.client.post(url).json(&params).send().await?;
        read_json(response).await
    }

    /// Pulls every page into memory by following `next` links.
    pub async fn search_all(&self, params: &Search) -> Result<ItemSet> {
        let params = self.with_page_size(params);
        let mut items: Vec<Item> = vec![];
        let mut page = self.search(&params).await?;
        let mut pages = 1;
        let matched = matched(&page);

        loop {
            let next = page.link("next").cloned();
            items.append(&mut page.items);

            if let Some(max) = self.max_items {
                if items.len() >= max {
                    items.truncate(max);
                    break;
                }
            }

            let Some(link) = next else { break };
            page = self.follow_next(&link, &params).await?;
            pages += 1;
            if page.items.is_empty() {
                break;
            }
        }

        info!(items = items.len(), pages, matched, "search materialized");
        Ok(ItemSet::new(items))
    }

    pub async fn search_by_ids(&self, collection: &str, ids: &[String]) -> Result<ItemSet> {
        let params = Search::new().collections(&[collection]).ids(ids.to_vec());
        self.search_all(&params).await
    }

    async fn follow_next(&self, link: &Link, original: &Search) -> Result<ItemCollection> {
        let url = self.base_url.join(&link.href)?;
        let method = link
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_uppercase();
        debug!(%url, %method, "following next link");

        let mut request = if method == "POST" {
            let body = match (&link.body, link.merge.unwrap_or(false)) {
                (Some(link_body), true) => {
                    let mut base = serde_json::to_value(original)?;
                    if let Some(base) = base.as_object_mut() {
                        for (k, v) in link_body {
                            base.insert(k.clone(), v.clone());
                        }
                    }
                    base
                }
                (Some(link_body), false) => Value::Object(link_body.clone()),
                (None, _) => serde_json::to_value(original)?,
            };
            self.client.request(Method::POST, url).json(&body)
        } else {
            self.client.get(url)
        };
        if let Some(headers) = &link.headers {
            for (name, value) in headers {
                if let Value::String(value) = value {
                    request = request.header(name.as_str(), value.as_str());
                }
            }
        }
        let response = request.send().await?;
        read_json(response).await
    }

    /// `params` with the configured page size as `limit` unless one is set.
    fn with_page_size(&self, params: &Search) -> Search {
        let mut params = params.clone();
        if params.items.limit.is_none() {
            params.items.limit = self.page_size.map(u64::from);
        }
        params
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.root_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Catalog url cannot be a base: {}", self.root_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Deserializes a success response; anything else comes back as
/// [`RemoteError::Api`] with the server's body untouched.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Api { url, status, body }.into());
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn read_item_from_file(path: &Path) -> Result<Item> {
    let content = read_to_string(path)?;
    let item: Item = serde_json::from_str(&content)?;
    Ok(item)
}
