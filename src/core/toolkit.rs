use crate::core::ground_truth::{GroundTruthJob, PixelShift};
use crate::io::raster;
use crate::types::{FixtureError, FixtureResult, GeoTransform};
use gdal::raster::{reproject, Buffer};
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Nodata written when the source band declares none
pub const FALLBACK_NODATA: f64 = -9999.0;

/// Reference terrain operations a ground-truth run delegates to
pub trait TerrainToolkit {
    /// Compute one catalog attribute of `source` into `output`
    fn dem_processing(&self, source: &Path, output: &Path, job: &GroundTruthJob)
        -> FixtureResult<()>;

    /// Resample `source` onto its own grid moved by `shift`
    fn shift_resample(&self, source: &Path, output: &Path, shift: &PixelShift)
        -> FixtureResult<()>;
}

/// GDAL backed toolkit: `gdaldem` for attributes, the warper for shifts
#[derive(Debug, Clone)]
pub struct GdalToolkit {
    gdaldem: PathBuf,
}

impl GdalToolkit {
    /// Use `gdaldem` from `PATH`
    pub fn new() -> Self {
        Self::with_executable("gdaldem")
    }

    pub fn with_executable<P: Into<PathBuf>>(gdaldem: P) -> Self {
        Self { gdaldem: gdaldem.into() }
    }

    /// Full argument list for one catalog job
    pub fn dem_arguments(source: &Path, output: &Path, job: &GroundTruthJob) -> Vec<String> {
        let mut args = vec![
            job.processing.mode().to_string(),
            source.display().to_string(),
            output.display().to_string(),
            "-of".to_string(),
            "GTiff".to_string(),
        ];
        args.extend(job.toolkit_options());
        args
    }
}

impl Default for GdalToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainToolkit for GdalToolkit {
    fn dem_processing(
        &self,
        source: &Path,
        output: &Path,
        job: &GroundTruthJob,
    ) -> FixtureResult<()> {
        let args = Self::dem_arguments(source, output, job);
        let command_line = format!("{} {}", self.gdaldem.display(), args.join(" "));
        log::debug!("Running {}", command_line);

        let result = Command::new(&self.gdaldem).args(&args).output()?;
        if !result.status.success() {
            return Err(FixtureError::Toolkit {
                command: command_line,
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn shift_resample(
        &self,
        source: &Path,
        output: &Path,
        shift: &PixelShift,
    ) -> FixtureResult<()> {
        let src = Dataset::open(source)?;
        let (cols, rows) = src.raster_size();
        let projection = src.projection();
        let nodata = src.rasterband(1)?.no_data_value().unwrap_or(FALLBACK_NODATA);
        let transform =
            GeoTransform::from(src.geo_transform()?).shifted(shift.x_offset, shift.y_offset);

        let mem_driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dest =
            mem_driver.create_with_band_type::<f32, _>("", cols as isize, rows as isize, 1)?;
        dest.set_projection(&projection)?;
        dest.set_geo_transform(&transform.to_array())?;
        raster::copy_metadata(&src, &mut dest)?;
        {
            let mut band = dest.rasterband(1)?;
            band.set_no_data_value(Some(nodata))?;
            let fill = Buffer::new((cols, rows), vec![nodata as f32; cols * rows]);
            band.write((0, 0), (cols, rows), &fill)?;
        }

        // bilinear, both datasets in their own projection
        reproject(&src, &dest)?;

        let resampled = dest
            .rasterband(1)?
            .read_as::<f32>((0, 0), (cols, rows), (cols, rows), None)?;
        let values: Vec<f32> = resampled
            .data
            .into_iter()
            .map(|v| if v == nodata as f32 { f32::NAN } else { v })
            .collect();

        let gtiff = DriverManager::get_driver_by_name("GTiff")?;
        let mut out =
            gtiff.create_with_band_type::<f32, _>(output, cols as isize, rows as isize, 1)?;
        out.set_geo_transform(&transform.to_array())?;
        out.set_projection(&projection)?;
        let mut band = out.rasterband(1)?;
        band.write((0, 0), (cols, rows), &Buffer::new((cols, rows), values))?;
        band.set_no_data_value(Some(nodata))?;

        log::info!("Saved {}", output.display());
        Ok(())
    }
}
