//! terrain-fixtures: example datasets and reference outputs for terrain
//! analysis tests
//!
//! This library fetches a small bundle of public Svalbard datasets (two DEMs
//! cropped to Longyearbyen, two glacier outline sets and a filtered ICESat-2
//! point cloud) and produces GDAL reference rasters to compare terrain
//! attribute implementations against.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{AcquisitionConfig, AltimetryQueryParams, GroundTruthConfig};
pub use core::{
    ExampleDataPipeline, GdalToolkit, GroundTruthRunner, TerrainToolkit, GROUND_TRUTH_CATALOG,
};
pub use types::{
    AcquisitionOutcome, BoundingRegion, DatasetDescriptor, DatasetKind, FixtureError,
    FixtureResult, GeoTransform, SourceLocator,
};
