use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stac_quickstart::config::ClientConfig;
use stac_quickstart::cube;
use stac_quickstart::download_plan::DownloadPlan;
use stac_quickstart::provider::KnownCatalog;
use stac_quickstart::query_selection::QuerySelection;
use stac_quickstart::raster::Raster;
use stac_quickstart::records::ItemSet;
use stac_quickstart::signing::HrefSigner;
use stac_quickstart::stac_operations::{AssetInfo, Catalog};
use stac_quickstart::storage::Storage;

#[derive(Parser)]
#[command(name = "stac-quickstart")]
#[command(version, about = "Search a STAC API, sign asset hrefs and load imagery")]
struct Cli {
    /// Client settings (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog root URL, or `pc` / `es` for Planetary Computer / Earth Search.
    /// Overrides the catalog of a query selection.
    #[arg(long, global = true)]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a query selection template for a known catalog
    Template {
        #[arg(short, long, default_value = "query_selection.toml")]
        output: PathBuf,
    },
    /// Run a query selection and list the matches
    Search {
        selection: PathBuf,

        /// Extra property columns for the listing
        #[arg(long, value_delimiter = ',', default_value = "eo:cloud_cover")]
        columns: Vec<String>,

        /// Also report the item with the lowest value of this property
        #[arg(long)]
        min_by: Option<String>,

        /// Write the matches as a GeoJSON FeatureCollection
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Show a collection's metadata and asset keys
    Collection { id: String },
    /// Print a signed copy of an asset href
    Sign { href: String },
    /// Read one asset of one item and summarize its pixels
    Read {
        collection: String,
        item: String,
        asset: String,
    },
    /// Stack the selected assets of every match into a datacube
    Stack { selection: PathBuf },
    /// Download the selected assets of every match, resuming partial files
    Download {
        selection: PathBuf,

        #[arg(short, long, default_value = "outputs")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ClientConfig::read(path)?,
        None => ClientConfig::default(),
    }
    .with_env();

    match cli.command {
        Commands::Template { output } => {
            let known = KnownCatalog::from_str_or_url(cli.catalog.as_deref().unwrap_or("pc"));
            let table = known
                .template()
                .ok_or(anyhow!("No template for catalog {}", known.stac_url()))?;
            QuerySelection::from_template(&table)?.write(&output)?;
            info!(output = %output.display(), "template written");
        }
        Commands::Search {
            selection,
            columns,
            min_by,
            geojson,
        } => {
            let selection = QuerySelection::read(selection)?;
            let (_, items) = run_selection(&config, cli.catalog.as_deref(), &selection).await?;
            let columns = columns.iter().map(String::as_str).collect::<Vec<_>>();
            print!("{}", items.table(&columns));
            if let Some(property) = min_by {
                match items.min_by_property(&property) {
                    Some(item) => println!("lowest {property}: {}", item.id),
                    None => println!("no item has {property}"),
                }
            }
            if let Some(path) = geojson {
                items.write_geojson(&path)?;
                info!(path = %path.display(), "matches written");
            }
        }
        Commands::Collection { id } => {
            let known = resolve_catalog(cli.catalog.as_deref(), None);
            let catalog = Catalog::open_with(known.stac_url(), &config).await?;
            let collection = catalog.collection(&id).await?;
            println!("{}", collection.title.as_deref().unwrap_or(&collection.id));
            if !collection.description.is_empty() {
                println!("\n{}\n", collection.description);
            }
            let item_assets = collection
                .additional_fields
                .get("item_assets")
                .and_then(|v| v.as_object());
            for key in item_assets.into_iter().flat_map(|assets| assets.keys()) {
                println!("  {key}");
            }
        }
        Commands::Sign { href } => {
            let known = resolve_catalog(cli.catalog.as_deref(), None);
            let signed = known.signer(&config)?.sign_href(&href).await?;
            match signed.expiry {
                Some(expiry) => info!(%expiry, "signed"),
                None => info!("href needs no signature"),
            }
            println!("{}", signed.href);
        }
        Commands::Read {
            collection,
            item,
            asset,
        } => {
            let known = resolve_catalog(cli.catalog.as_deref(), None);
            let catalog = Catalog::open_with(known.stac_url(), &config).await?;
            let item = catalog.item(&collection, &item).await?;
            let info = AssetInfo::from_item(&item, &asset)?;
            let signed = known.signer(&config)?.sign_href(&info.href).await?;
            let storage = Storage::from_config(&config).await?;
            let raster = Raster::open(&storage, &signed).await?;

            println!(
                "{} {}: {} band(s), {} x {} pixels, EPSG {:?}",
                info.item_id,
                info.key,
                raster.band_count(),
                raster.width(),
                raster.height(),
                raster.epsg
            );
            if let Some(bounds) = raster.bounds() {
                println!("bounds: {:?}", bounds);
            }
            for band in 0..raster.band_count() {
                match raster.band_stats(band) {
                    Some(s) => println!(
                        "band {band}: min {} max {} mean {:.2} ({} valid)",
                        s.min, s.max, s.mean, s.valid
                    ),
                    None => println!("band {band}: no valid pixels"),
                }
            }
        }
        Commands::Stack { selection } => {
            let selection = QuerySelection::read(selection)?;
            let assets = selection.asset_keys()?;
            let (known, items) = run_selection(&config, cli.catalog.as_deref(), &selection).await?;
            let storage = Storage::from_config(&config).await?;
            let cube = cube::stack(&items, assets.as_slice(), &known.signer(&config)?, &storage).await?;

            println!("datacube (time, band, row, col): {:?}", cube.shape());
            for (time, ids) in cube.times.iter().zip(&cube.item_ids) {
                println!("  {}  {}", time.format("%Y-%m-%dT%H:%M:%SZ"), ids.join(", "));
            }
        }
        Commands::Download {
            selection,
            output_dir,
        } => {
            let selection = QuerySelection::read(selection)?;
            let assets = selection.asset_keys()?;
            let (known, items) = run_selection(&config, cli.catalog.as_deref(), &selection).await?;

            let plan = DownloadPlan::from_items(&items, assets.as_slice(), &output_dir)?;
            std::fs::create_dir_all(&output_dir)?;
            plan.write(output_dir.join("download_plan.json"))?;

            let storage = Storage::from_config(&config).await?;
            plan.execute(&storage, &known.signer(&config)?).await?;
        }
    }

    Ok(())
}

fn resolve_catalog(flag: Option<&str>, selection: Option<&QuerySelection>) -> KnownCatalog {
    let url = flag
        .or(selection.map(|s| s.catalog.as_str()))
        .unwrap_or("pc");
    KnownCatalog::from_str_or_url(url)
}

async fn run_selection(
    config: &ClientConfig,
    catalog_flag: Option<&str>,
    selection: &QuerySelection,
) -> Result<(KnownCatalog, ItemSet)> {
    let known = resolve_catalog(catalog_flag, Some(selection));
    let catalog = Catalog::open_with(known.stac_url(), config).await?;
    let items = catalog.search_all(&selection.to_search()).await?;
    info!(selection = %selection.id, items = items.len(), "selection matched");
    Ok((known, items))
}
