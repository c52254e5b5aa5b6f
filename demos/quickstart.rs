use anyhow::Result;
use tracing_subscriber::EnvFilter;

extern crate stac_quickstart;
use stac_quickstart::config::ClientConfig;
use stac_quickstart::provider::get_asset_info;
use stac_quickstart::provider::planetary_computer::{
    self, sentinel_2_l2a, PlanetaryComputerCollection,
};
use stac_quickstart::raster::Raster;
use stac_quickstart::search::{Predicate, Search, SearchBuilder};
use stac_quickstart::signing::{HrefSigner, SasSigner};
use stac_quickstart::stac_operations::Catalog;
use stac_quickstart::storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::default().with_env();
    let catalog = Catalog::open_with(planetary_computer::STAC_API, &config).await?;

    let params = Search::new()
        .collections(&[sentinel_2_l2a::COLLECTION])
        .bbox(-122.2751, 47.5469, -121.9613, 47.7458)
        .datetime("2020-12-01/2020-12-31")
        .query("eo:cloud_cover", Predicate::lt(80));
    let items = catalog.search_all(&params).await?;
    print!("{}", items.table(&["eo:cloud_cover", "s2:mgrs_tile"]));

    let least_cloudy = items
        .min_by_property("eo:cloud_cover")
        .ok_or(anyhow::anyhow!("No items with eo:cloud_cover"))?;
    println!("least cloudy: {}", least_cloudy.id);

    let red = get_asset_info(
        &catalog,
        PlanetaryComputerCollection::Sentinel2L2A,
        &least_cloudy.id,
        sentinel_2_l2a::AssetKind::Red,
    )
    .await?;
    println!("{} ({:?} bytes)", red.href, red.size);

    let signer = SasSigner::new(&config)?;
    let signed = signer.sign_href(&red.href).await?;

    let storage = Storage::from_config(&config).await?;
    let raster = Raster::open(&storage, &signed).await?;
    println!(
        "B04: {} x {} pixels, EPSG {:?}, bounds {:?}",
        raster.width(),
        raster.height(),
        raster.epsg,
        raster.bounds()
    );
    if let Some(stats) = raster.band_stats(0) {
        println!("min {} max {} mean {:.1}", stats.min, stats.max, stats.mean);
    }

    Ok(())
}
