//! Reference terrain attributes computed by an external toolkit
//!
//! The catalog is fixed: every run writes the same ten attribute rasters,
//! named after the attribute, whatever the input DEM contains.

use crate::core::toolkit::TerrainToolkit;
use crate::io::raster;
use crate::types::{decimal_string, FixtureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Terrain processing modes of the toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemProcessing {
    Slope,
    Aspect,
    Hillshade,
    /// Terrain Ruggedness Index
    Tri,
    /// Topographic Position Index
    Tpi,
    Roughness,
}

impl DemProcessing {
    /// Mode name as the toolkit spells it
    pub fn mode(&self) -> &'static str {
        match self {
            DemProcessing::Slope => "slope",
            DemProcessing::Aspect => "aspect",
            DemProcessing::Hillshade => "hillshade",
            DemProcessing::Tri => "TRI",
            DemProcessing::Tpi => "TPI",
            DemProcessing::Roughness => "roughness",
        }
    }
}

/// Neighbourhood algorithm variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemAlgorithm {
    Horn,
    ZevenbergenThorne,
    Riley,
    Wilson,
}

impl DemAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DemAlgorithm::Horn => "Horn",
            DemAlgorithm::ZevenbergenThorne => "ZevenbergenThorne",
            DemAlgorithm::Riley => "Riley",
            DemAlgorithm::Wilson => "Wilson",
        }
    }
}

/// Light source for hillshading, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Illumination {
    pub azimuth: f64,
    pub altitude: f64,
}

/// Sun from the north-west, 45 degrees above the horizon
pub const DEFAULT_ILLUMINATION: Illumination = Illumination {
    azimuth: 315.0,
    altitude: 45.0,
};

/// One catalog entry: an attribute and how the toolkit computes it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundTruthJob {
    pub attribute: &'static str,
    pub processing: DemProcessing,
    pub algorithm: Option<DemAlgorithm>,
    pub illumination: Option<Illumination>,
}

impl GroundTruthJob {
    const fn new(
        attribute: &'static str,
        processing: DemProcessing,
        algorithm: Option<DemAlgorithm>,
    ) -> Self {
        Self {
            attribute,
            processing,
            algorithm,
            illumination: None,
        }
    }

    const fn hillshade(attribute: &'static str, algorithm: DemAlgorithm) -> Self {
        Self {
            attribute,
            processing: DemProcessing::Hillshade,
            algorithm: Some(algorithm),
            illumination: Some(DEFAULT_ILLUMINATION),
        }
    }

    /// Option flags passed to the toolkit after the mode and file names
    pub fn toolkit_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(illumination) = &self.illumination {
            options.extend([
                "-az".to_string(),
                illumination.azimuth.to_string(),
                "-alt".to_string(),
                illumination.altitude.to_string(),
            ]);
        }
        if let Some(algorithm) = &self.algorithm {
            options.extend(["-alg".to_string(), algorithm.name().to_string()]);
        }
        options
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.tif", self.attribute)
    }
}

/// Every attribute written by a ground-truth run
pub const GROUND_TRUTH_CATALOG: [GroundTruthJob; 10] = [
    GroundTruthJob::new("slope_Horn", DemProcessing::Slope, Some(DemAlgorithm::Horn)),
    GroundTruthJob::new("aspect_Horn", DemProcessing::Aspect, Some(DemAlgorithm::Horn)),
    GroundTruthJob::hillshade("hillshade_Horn", DemAlgorithm::Horn),
    GroundTruthJob::new(
        "slope_Zevenberg",
        DemProcessing::Slope,
        Some(DemAlgorithm::ZevenbergenThorne),
    ),
    GroundTruthJob::new(
        "aspect_Zevenberg",
        DemProcessing::Aspect,
        Some(DemAlgorithm::ZevenbergenThorne),
    ),
    GroundTruthJob::hillshade("hillshade_Zevenberg", DemAlgorithm::ZevenbergenThorne),
    GroundTruthJob::new("tri_Riley", DemProcessing::Tri, Some(DemAlgorithm::Riley)),
    GroundTruthJob::new("tri_Wilson", DemProcessing::Tri, Some(DemAlgorithm::Wilson)),
    GroundTruthJob::new("tpi", DemProcessing::Tpi, None),
    GroundTruthJob::new("roughness", DemProcessing::Roughness, None),
];

/// Horizontal offset in georeferenced units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelShift {
    pub x_offset: f64,
    pub y_offset: f64,
}

impl PixelShift {
    pub fn output_file_name(&self) -> String {
        format!(
            "shifted_reprojected_xoff{}_yoff{}.tif",
            format_offset(self.x_offset),
            format_offset(self.y_offset)
        )
    }
}

/// Offset as it appears in comparison file names (`20.0`, `-2.4`)
pub fn format_offset(value: f64) -> String {
    decimal_string(value)
}

/// One pixel, ten pixels and minus 1.2 pixels in both directions
pub fn comparison_shifts(resolution: (f64, f64)) -> Vec<PixelShift> {
    let (res_x, res_y) = resolution;
    [1.0, 10.0, -1.2]
        .iter()
        .map(|factor| PixelShift {
            x_offset: factor * res_x,
            y_offset: factor * res_y,
        })
        .collect()
}

/// Runs the catalog against a toolkit
pub struct GroundTruthRunner<T: TerrainToolkit> {
    toolkit: T,
}

impl<T: TerrainToolkit> GroundTruthRunner<T> {
    pub fn new(toolkit: T) -> Self {
        Self { toolkit }
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    /// Write one raster per catalog entry into `output_dir`, always
    /// recomputing existing outputs
    pub fn generate_ground_truth<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source: P,
        output_dir: Q,
    ) -> FixtureResult<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir.as_ref())?;

        let mut outputs = Vec::with_capacity(GROUND_TRUTH_CATALOG.len());
        for job in &GROUND_TRUTH_CATALOG {
            log::info!("Processing terrain truth for: {}", job.attribute);

            let output = output_dir.as_ref().join(job.output_file_name());
            self.toolkit.dem_processing(source.as_ref(), &output, job)?;
            outputs.push(output);
        }

        Ok(outputs)
    }

    /// Ground truth plus shifted and resampled copies of the source
    pub fn generate_comparison<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source: P,
        output_dir: Q,
    ) -> FixtureResult<Vec<PathBuf>> {
        let mut outputs = self.generate_ground_truth(source.as_ref(), output_dir.as_ref())?;

        let resolution = raster::raster_transform(source.as_ref())?.resolution();
        for shift in comparison_shifts(resolution) {
            log::info!(
                "Shifting by ({}, {}) and resampling",
                shift.x_offset,
                shift.y_offset
            );

            let output = output_dir.as_ref().join(shift.output_file_name());
            self.toolkit.shift_resample(source.as_ref(), &output, &shift)?;
            outputs.push(output);
        }

        Ok(outputs)
    }
}
