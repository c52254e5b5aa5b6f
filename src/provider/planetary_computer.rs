use super::STACCollection;

pub const STAC_API: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";

pub enum PlanetaryComputerCollection {
    Sentinel2L2A,
    LandsatC2L2,
}

impl STACCollection for PlanetaryComputerCollection {
    fn key(&self) -> &str {
        match self {
            Self::Sentinel2L2A => sentinel_2_l2a::COLLECTION,
            Self::LandsatC2L2 => "landsat-c2-l2",
        }
    }
}

pub mod sentinel_2_l2a {
    use crate::provider::{AssetDescription, AssetKey};

    pub const COLLECTION: &str = "sentinel-2-l2a";

    #[derive(Debug, Clone, Copy)]
    pub enum AssetKind {
        Coastal,
        Blue,
        Green,
        Red,
        RedEdge1,
        RedEdge2,
        RedEdge3,
        NIR,
        NIR08,
        WVP,
        SWIR16,
        SWIR22,
        AOT,
        SCL,
        Visual,
        Preview,
    }

    impl AssetKey for AssetKind {
        fn key(&self) -> &str {
            match self {
                Self::Coastal => "B01",
                Self::Blue => "B02",
                Self::Green => "B03",
                Self::Red => "B04",
                Self::RedEdge1 => "B05",
                Self::RedEdge2 => "B06",
                Self::RedEdge3 => "B07",
                Self::NIR => "B08",
                Self::NIR08 => "B8A",
                Self::WVP => "WVP",
                Self::SWIR16 => "B11",
                Self::SWIR22 => "B12",
                Self::AOT => "AOT",
                Self::SCL => "SCL",
                Self::Visual => "visual",
                Self::Preview => "rendered_preview",
            }
        }
    }

    impl AssetDescription for AssetKind {
        fn description(&self) -> &str {
            match self {
                Self::Coastal => "Band 1 - Coastal aerosol - 60m",
                Self::Blue => "Band 2 - Blue - 10m",
                Self::Green => "Band 3 - Green - 10m",
                Self::Red => "Band 4 - Red - 10m",
                Self::RedEdge1 => "Band 5 - Vegetation red edge 1 - 20m",
                Self::RedEdge2 => "Band 6 - Vegetation red edge 2 - 20m",
                Self::RedEdge3 => "Band 7 - Vegetation red edge 3 - 20m",
                Self::NIR => "Band 8 - NIR - 10m",
                Self::NIR08 => "Band 8A - Vegetation red edge 4 - 20m",
                Self::WVP => "Water vapour (WVP)",
                Self::SWIR16 => "Band 11 - SWIR (1.6) - 20m",
                Self::SWIR22 => "Band 12 - SWIR (2.2) - 20m",
                Self::AOT => "Aerosol optical thickness (AOT)",
                Self::SCL => "Scene classfication map (SCL)",
                Self::Visual => "True color image",
                Self::Preview => "Rendered preview",
            }
        }
    }

    pub fn query_selection_toml() -> toml::Table {
        toml::toml! {
            id = "planetary-computer.sentinel-2-l2a"

            catalog = "https://planetarycomputer.microsoft.com/api/stac/v1"

            name = "Sentinel-2 Level-2A"

            description = "Global Sentinel-2 bottom-of-atmosphere reflectance from 2016 to present,\n\
            processed to L2A with Sen2Cor and converted to cloud-optimized GeoTIFF.\n\
            Assets live in Azure Blob Storage and must be signed before they are read."

            docs = "https://planetarycomputer.microsoft.com/dataset/sentinel-2-l2a"

            collections = ["sentinel-2-l2a"]

            bbox = [-122.2751, 47.5469, -121.9613, 47.7458]

            datetime = "2020-12-01/2020-12-31"

            ids = [
                "S2B_MSIL2A_20201206T190749_R013_T10TET_20201207T190022",
                "S2B_MSIL2A_20201206T190749_R013_T10TET_20201207T190022",
                "S2A_MSIL2A_20201211T190811_R013_T10TET_20201212T060914",
            ]

            [[query]]
            property = "eo:cloud_cover"
            op = "lt"
            value = 20

            [[assets]]
            id = "B04"
            name = "Red"
            load = true

            [[assets]]
            id = "B08"
            name = "NIR"
            load = true

            [[assets]]
            id = "visual"
            name = "True Color"
            load = false

            [[assets]]
            id = "SCL"
            name = "Scene Classification"
            load = false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sentinel_2_l2a::AssetKind;
    use super::*;
    use crate::provider::{AssetDescription, AssetKey};

    #[test]
    fn test_asset_keys() {
        assert_eq!(AssetKind::Red.key(), "B04");
        assert_eq!(AssetKind::NIR08.key(), "B8A");
        assert_eq!(AssetKind::Visual.description(), "True color image");
        assert_eq!(PlanetaryComputerCollection::Sentinel2L2A.key(), "sentinel-2-l2a");
    }
}
