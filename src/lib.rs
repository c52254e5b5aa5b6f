#![allow(async_fn_in_trait)]
pub mod config;
pub mod cube;
pub mod download_plan;
pub mod error;
pub mod provider;
pub mod query_selection;
pub mod raster;
pub mod records;
pub mod s3_operations;
pub mod search;
pub mod signing;
pub mod stac_operations;
pub mod storage;
