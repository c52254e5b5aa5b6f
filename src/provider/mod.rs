use anyhow::Result;

use crate::config::ClientConfig;
use crate::signing::{NoSigning, SasSigner, Signer};
use crate::stac_operations::{AssetInfo, Catalog};

pub mod element84;
pub mod planetary_computer;

pub trait STACCollection {
    fn key(&self) -> &str;
}

pub trait AssetKey {
    fn key(&self) -> &str;
}

pub trait AssetDescription {
    fn description(&self) -> &str;
}

/// Catalogs with known endpoints. Anything else is used as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownCatalog {
    PlanetaryComputer,
    EarthSearch,
    Custom(String),
}

impl KnownCatalog {
    /// Recognises `pc`/`planetary-computer` and `es`/`earth-search` as well as
    /// the catalogs' own root URLs.
    pub fn from_str_or_url(s: &str) -> Self {
        let trimmed = s.trim_end_matches('/');
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ if trimmed == planetary_computer::STAC_API => Self::PlanetaryComputer,
            _ if trimmed == element84::STAC_API => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    pub fn stac_url(&self) -> &str {
        match self {
            Self::PlanetaryComputer => planetary_computer::STAC_API,
            Self::EarthSearch => element84::STAC_API,
            Self::Custom(url) => url,
        }
    }

    /// Whether asset hrefs must be signed before they can be read.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }

    /// SAS signing for catalogs that need it, a passthrough otherwise.
    pub fn signer(&self, config: &ClientConfig) -> Result<Signer> {
        if self.needs_signing() {
            Ok(Signer::Sas(SasSigner::new(config)?))
        } else {
            Ok(Signer::Public(NoSigning))
        }
    }

    pub fn template(&self) -> Option<toml::Table> {
        match self {
            Self::PlanetaryComputer => Some(planetary_computer::sentinel_2_l2a::query_selection_toml()),
            Self::EarthSearch => Some(element84::sentinel_2_c1_l2a::query_selection_toml()),
            Self::Custom(_) => None,
        }
    }
}

/// Looks up one asset of one item in a known collection.
pub async fn get_asset_info(
    catalog: &Catalog,
    collection: impl STACCollection,
    id: &str,
    asset: impl AssetKey,
) -> Result<AssetInfo> {
    let item = catalog.item(collection.key(), id).await?;
    AssetInfo::from_item(&item, asset.key())
}
