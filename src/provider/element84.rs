use super::STACCollection;

pub const STAC_API: &str = "https://earth-search.aws.element84.com/v1";

pub enum Element84Collection {
    Sentinel2C1L2A,
    Sentinel2L2A,
}

impl STACCollection for Element84Collection {
    fn key(&self) -> &str {
        match self {
            Self::Sentinel2C1L2A => sentinel_2_c1_l2a::COLLECTION,
            Self::Sentinel2L2A => "sentinel-2-l2a",
        }
    }
}

pub mod sentinel_2_c1_l2a {
    use crate::provider::{AssetDescription, AssetKey};

    pub const COLLECTION: &str = "sentinel-2-c1-l2a";

    #[derive(Debug, Clone, Copy)]
    pub enum AssetKind {
        Red,
        Green,
        Blue,
        Visual,
        NIR,
        NIR08,
        SWIR16,
        SWIR22,
        SCL,
        Thumbnail,
    }

    impl AssetKey for AssetKind {
        fn key(&self) -> &str {
            match self {
                Self::Red => "red",
                Self::Green => "green",
                Self::Blue => "blue",
                Self::Visual => "visual",
                Self::NIR => "nir",
                Self::NIR08 => "nir08",
                Self::SWIR16 => "swir16",
                Self::SWIR22 => "swir22",
                Self::SCL => "scl",
                Self::Thumbnail => "thumbnail",
            }
        }
    }

    impl AssetDescription for AssetKind {
        fn description(&self) -> &str {
            match self {
                Self::Red => "Red - 10m",
                Self::Green => "Green - 10m",
                Self::Blue => "Blue - 10m",
                Self::Visual => "True color image",
                Self::NIR => "NIR 1 - 10m",
                Self::NIR08 => "NIR 2 - 20m",
                Self::SWIR16 => "SWIR 1.6um - 20m",
                Self::SWIR22 => "SWIR 2.2um - 20m",
                Self::SCL => "Scene classification map",
                Self::Thumbnail => "Thumbnail image",
            }
        }
    }

    pub fn query_selection_toml() -> toml::Table {
        toml::toml! {
            id = "element84.sentinel-2-c1-l2a"

            catalog = "https://earth-search.aws.element84.com/v1"

            name = "Sentinel-2 Collection 1 Level-2A"

            description = "Sentinel-2 Collection 1 L2A surface reflectance as cloud-optimized GeoTIFFs\n\
            in a public S3 bucket. Assets can be read without signing."

            docs = "https://element84.com/earth-search/"

            collections = ["sentinel-2-c1-l2a"]

            bbox = [-136.2, 60.6, -135.0, 61.0]

            datetime = "2024-05-01/2024-05-31"

            [[query]]
            property = "eo:cloud_cover"
            op = "lt"
            value = 30

            [[assets]]
            id = "red"
            name = "Red"
            load = true

            [[assets]]
            id = "nir"
            name = "NIR"
            load = true

            [[assets]]
            id = "visual"
            name = "True Color"
            load = false
        }
    }
}
