use anyhow::Result;
use tracing_subscriber::EnvFilter;

extern crate stac_quickstart;
use stac_quickstart::config::ClientConfig;
use stac_quickstart::cube;
use stac_quickstart::provider::planetary_computer::{self, sentinel_2_l2a};
use stac_quickstart::search::{Direction, Predicate, Search, SearchBuilder};
use stac_quickstart::signing::SasSigner;
use stac_quickstart::stac_operations::Catalog;
use stac_quickstart::storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig {
        page_size: Some(10),
        max_items: Some(3),
        ..ClientConfig::default()
    }
    .with_env();
    let catalog = Catalog::open_with(planetary_computer::STAC_API, &config).await?;

    // One MGRS tile keeps every layer on the same grid
    let params = Search::new()
        .collections(&[sentinel_2_l2a::COLLECTION])
        .bbox(-122.2751, 47.5469, -121.9613, 47.7458)
        .datetime("2020-06-01/2020-08-31")
        .query("s2:mgrs_tile", Predicate::eq("10TET"))
        .query("eo:cloud_cover", Predicate::lt(10))
        .sortby("datetime", Direction::Ascending);
    let items = catalog.search_all(&params).await?;
    print!("{}", items.table(&["eo:cloud_cover"]));

    let bands = ["B05", "B8A"];
    let signer = SasSigner::new(&config)?;
    let storage = Storage::from_config(&config).await?;
    let cube = cube::stack(&items, &bands, &signer, &storage).await?;

    println!("datacube (time, band, row, col): {:?}", cube.shape());
    let nir = cube.band_index("B8A").unwrap_or(1);
    let median = cube.median_over_time(nir);
    let valid = median.iter().filter(|v| !v.is_nan()).count();
    println!("B8A median composite: {valid} valid pixels");

    Ok(())
}
