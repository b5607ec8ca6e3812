//! Immutable configuration for the acquisition pipeline and ground-truth runs

use crate::types::{BoundingRegion, DatasetDescriptor, DatasetKind, FixtureResult, SourceLocator};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const LONGYEARBYEN_REF_DEM: &str = "longyearbyen_ref_dem";
pub const LONGYEARBYEN_TBA_DEM: &str = "longyearbyen_tba_dem";
pub const LONGYEARBYEN_GLACIER_OUTLINES: &str = "longyearbyen_glacier_outlines";
pub const LONGYEARBYEN_GLACIER_OUTLINES_2010: &str = "longyearbyen_glacier_outlines_2010";
pub const LONGYEARBYEN_EPC: &str = "longyearbyen_epc";

const REF_DEM_URL: &str = "zip+https://publicdatasets.data.npolar.no/kartdata/S0_Terrengmodell/\
                           Mosaikk/NP_S0_DTM20.zip!NP_S0_DTM20/S0_DTM20.tif";
const TBA_DEM_URL: &str = "zip+https://publicdatasets.data.npolar.no/kartdata/S0_Terrengmodell/\
                           Historisk/NP_S0_DTM20_199095_33.zip!NP_S0_DTM20_199095_33/S0_DTM20_199095_33.tif";
const OUTLINES_1990_URL: &str = "http://public.data.npolar.no/cryoclim/CryoClim_GAO_SJ_1990.zip";
const OUTLINES_2010_URL: &str = "https://public.data.npolar.no/cryoclim/CryoClim_GAO_SJ_2001-2010.zip";

/// Default altimetry service endpoint
pub const SLIDERULE_URL: &str = "https://sliderule.slideruleearth.io";

/// Land surface type
pub const SRT_LAND: i32 = 0;
/// High surface confidence
pub const CNF_SURFACE_HIGH: i32 = 4;

/// Fixed parameters of the altimetry point query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltimetryQueryParams {
    pub surface_type: i32,
    pub confidence: i32,
    /// Minimum along-track spread
    pub along_track_spread: f64,
    /// Minimum photon count
    pub min_count: u32,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
}

impl Default for AltimetryQueryParams {
    fn default() -> Self {
        Self {
            surface_type: SRT_LAND,
            confidence: CNF_SURFACE_HIGH,
            along_track_spread: 20.0,
            min_count: 10,
            start_time: utc_midnight(2018, 1, 1),
            stop_time: utc_midnight(2022, 1, 1),
        }
    }
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Everything the acquisition pipeline needs to know about one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Rasters and outlines fetched together as one bundle
    pub bundle: Vec<DatasetDescriptor>,
    /// Point cloud produced by the altimetry query
    pub point_cloud: DatasetDescriptor,
    pub region: BoundingRegion,
    pub altimetry: AltimetryQueryParams,
    pub altimetry_url: String,
}

impl AcquisitionConfig {
    /// Stock Longyearbyen (Svalbard) example set rooted at `data_dir`
    pub fn longyearbyen<P: AsRef<Path>>(data_dir: P) -> FixtureResult<Self> {
        let site = data_dir.as_ref().join("Longyearbyen");
        let outlines = site.join("glacier_mask");

        let bundle = vec![
            DatasetDescriptor::new(
                LONGYEARBYEN_REF_DEM,
                site.join("DEM_2009_ref.tif"),
                Some(SourceLocator::parse(REF_DEM_URL)?),
                DatasetKind::Raster,
            ),
            DatasetDescriptor::new(
                LONGYEARBYEN_TBA_DEM,
                site.join("DEM_1990.tif"),
                Some(SourceLocator::parse(TBA_DEM_URL)?),
                DatasetKind::Raster,
            ),
            DatasetDescriptor::new(
                LONGYEARBYEN_GLACIER_OUTLINES,
                outlines.join("CryoClim_GAO_SJ_1990.shp"),
                Some(SourceLocator::parse(OUTLINES_1990_URL)?),
                DatasetKind::Outlines,
            ),
            DatasetDescriptor::new(
                LONGYEARBYEN_GLACIER_OUTLINES_2010,
                outlines.join("CryoClim_GAO_SJ_2010.shp"),
                Some(SourceLocator::parse(OUTLINES_2010_URL)?),
                DatasetKind::Outlines,
            ),
        ];

        let point_cloud = DatasetDescriptor::new(
            LONGYEARBYEN_EPC,
            site.join("EPC_IS2.parquet"),
            None,
            DatasetKind::PointCloud,
        );

        Ok(Self {
            bundle,
            point_cloud,
            region: BoundingRegion::new(502810.0, 529450.0, 8654330.0, 8674030.0, 25833),
            altimetry: AltimetryQueryParams::default(),
            altimetry_url: SLIDERULE_URL.to_string(),
        })
    }

    /// Look up a dataset of the run by logical name
    pub fn dataset(&self, name: &str) -> Option<&DatasetDescriptor> {
        self.bundle
            .iter()
            .chain(std::iter::once(&self.point_cloud))
            .find(|d| d.name == name)
    }

    /// Directories that must exist before any bundle member is written
    pub fn bundle_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .bundle
            .iter()
            .filter_map(|d| d.path.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

/// Locations used by the ground-truth and comparison generators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthConfig {
    pub source: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for GroundTruthConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data/Longyearbyen/DEM_2009_ref.tif"),
            output_dir: PathBuf::from("test_data/gdal"),
        }
    }
}
