//! Against the live Planetary Computer and Earth Search APIs. Run with
//! `cargo test -- --ignored`.

use stac_quickstart::config::ClientConfig;
use stac_quickstart::error::RemoteError;
use stac_quickstart::provider::planetary_computer::{self, sentinel_2_l2a};
use stac_quickstart::provider::{element84, KnownCatalog};
use stac_quickstart::records::ItemExt;
use stac_quickstart::search::{Predicate, Search, SearchBuilder};
use stac_quickstart::signing::{HrefSigner, SasSigner};
use stac_quickstart::stac_operations::Catalog;
use stac_quickstart::storage::{HttpStorage, ObjectRead};

fn seattle_december() -> Search {
    Search::new()
        .collections(&[sentinel_2_l2a::COLLECTION])
        .bbox(-122.2751, 47.5469, -121.9613, 47.7458)
        .datetime("2020-12-01/2020-12-31")
}

#[tokio::test]
#[ignore]
async fn test_search_is_repeatable() {
    let config = ClientConfig {
        page_size: Some(5),
        ..ClientConfig::default()
    }
    .with_env();
    let catalog = Catalog::open_with(planetary_computer::STAC_API, &config)
        .await
        .unwrap();
    let first = catalog.search_all(&seattle_december()).await.unwrap();
    let second = catalog.search_all(&seattle_december()).await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first.len(), second.len());

    let clear = catalog
        .search_all(&seattle_december().query("eo:cloud_cover", Predicate::lt(20)))
        .await
        .unwrap();
    assert!(clear.iter().all(|i| i.cloud_cover().unwrap() < 20.0));
}

#[tokio::test]
#[ignore]
async fn test_signed_asset_is_readable() {
    let config = ClientConfig::default().with_env();
    let catalog = Catalog::open_with(planetary_computer::STAC_API, &config)
        .await
        .unwrap();
    let items = catalog.search_all(&seattle_december().limit(10)).await.unwrap();
    let item = items.min_by_property("eo:cloud_cover").unwrap();
    let href = &item.asset("B04").unwrap().href;

    let storage = HttpStorage::from_config(&config).unwrap();
    let err = storage.head_object(href).await.unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().unwrap();
    assert!(remote.is_access_denied());

    let signer = SasSigner::new(&config).unwrap();
    let signed = signer.sign_href(href).await.unwrap();
    let head = storage.head_object(&signed.href).await.unwrap();
    assert!(head.content_length.unwrap() > 0);

    // The first bytes are a TIFF header
    let bytes = storage.get_object_range(&signed.href, 0, 3).await.unwrap();
    assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"II+\0"));
}

#[tokio::test]
#[ignore]
async fn test_earth_search_needs_no_signing() {
    let known = KnownCatalog::EarthSearch;
    let catalog = Catalog::open(known.stac_url()).await.unwrap();
    let params = Search::new()
        .collections(&[element84::sentinel_2_c1_l2a::COLLECTION])
        .bbox(-136.2, 60.6, -135.0, 61.0)
        .datetime("2024-05-01/2024-05-31")
        .limit(2);
    let page = catalog.search(&params).await.unwrap();
    let item = page.items.first().unwrap();
    let href = &item.asset("red").unwrap().href;

    let config = ClientConfig::default();
    let signed = known.signer(&config).unwrap().sign_href(href).await.unwrap();
    assert_eq!(&signed.href, href);
    let head = HttpStorage::from_config(&config)
        .unwrap()
        .head_object(&signed.href)
        .await
        .unwrap();
    assert!(head.content_length.unwrap() > 0);
}
