//! I/O modules for fetching archives and reading/writing rasters, outlines
//! and point clouds

pub mod altimetry;
pub mod fetch;
pub mod raster;
pub mod vector;

pub use altimetry::{AltimetryRequest, AltimetryService, SlideRuleClient};
pub use fetch::{HttpFetcher, RemoteFetcher};
pub use vector::{AttributeValue, Column, ColumnKind, FeatureTable};
