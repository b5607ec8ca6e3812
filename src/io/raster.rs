use crate::types::{BoundingRegion, FixtureError, FixtureResult, GeoTransform, RasterWindow};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

/// Pixel window covering `region` on a raster with the given transform and
/// size.
///
/// Rows and columns come from the north-west and south-east corners of the
/// region. The window must be non-empty and lie inside the raster.
pub fn window_for_region(
    transform: &GeoTransform,
    raster_size: (usize, usize),
    region: &BoundingRegion,
) -> FixtureResult<RasterWindow> {
    let (west, north) = region.upper_left();
    let (east, south) = region.lower_right();
    let (upper, left) = transform.index(west, north);
    let (lower, right) = transform.index(east, south);
    let (width, height) = raster_size;

    log::debug!(
        "Region {:?} maps to rows {}..{}, columns {}..{}",
        region,
        upper,
        lower,
        left,
        right
    );

    if upper < 0 || left < 0 || lower > height as i64 || right > width as i64 {
        return Err(FixtureError::InvalidFormat(format!(
            "Crop window rows {}..{}, columns {}..{} exceeds raster of {}x{} pixels",
            upper, lower, left, right, width, height
        )));
    }
    if lower <= upper || right <= left {
        return Err(FixtureError::InvalidFormat(format!(
            "Crop window rows {}..{}, columns {}..{} is empty",
            upper, lower, left, right
        )));
    }

    Ok(RasterWindow {
        row_off: upper as usize,
        col_off: left as usize,
        rows: (lower - upper) as usize,
        cols: (right - left) as usize,
    })
}

/// Read one band window into an array
pub fn read_window<T: GdalType + Copy>(
    dataset: &Dataset,
    band_index: isize,
    window: &RasterWindow,
) -> FixtureResult<Array2<T>> {
    let band = dataset.rasterband(band_index)?;
    let buffer = band.read_as::<T>(
        (window.col_off as isize, window.row_off as isize),
        (window.cols, window.rows),
        (window.cols, window.rows),
        None,
    )?;

    Array2::from_shape_vec((window.rows, window.cols), buffer.data)
        .map_err(|e| FixtureError::Processing(format!("Failed to reshape raster window: {}", e)))
}

/// Crop a raster to the region and write it as a GeoTIFF.
///
/// The output keeps data type, band count, per-band nodata, projection and
/// default-domain metadata of the source; only the transform and size change.
pub fn crop_raster<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    region: &BoundingRegion,
) -> FixtureResult<RasterWindow> {
    log::info!("Cropping {}", input_path.as_ref().display());

    let source = Dataset::open(input_path.as_ref())?;
    let transform = GeoTransform::from(source.geo_transform()?);
    let window = window_for_region(&transform, source.raster_size(), region)?;
    let band_type = source.rasterband(1)?.band_type();

    log::debug!("Crop window {:?}, band type {:?}", window, band_type);

    match band_type {
        GdalDataType::UInt8 => write_window::<u8>(&source, output_path.as_ref(), &window)?,
        GdalDataType::UInt16 => write_window::<u16>(&source, output_path.as_ref(), &window)?,
        GdalDataType::Int16 => write_window::<i16>(&source, output_path.as_ref(), &window)?,
        GdalDataType::UInt32 => write_window::<u32>(&source, output_path.as_ref(), &window)?,
        GdalDataType::Int32 => write_window::<i32>(&source, output_path.as_ref(), &window)?,
        GdalDataType::Float32 => write_window::<f32>(&source, output_path.as_ref(), &window)?,
        GdalDataType::Float64 => write_window::<f64>(&source, output_path.as_ref(), &window)?,
        other => {
            return Err(FixtureError::InvalidFormat(format!(
                "Unsupported raster data type: {:?}",
                other
            )))
        }
    }

    log::info!("Saved {}", output_path.as_ref().display());
    Ok(window)
}

fn write_window<T: GdalType + Copy>(
    source: &Dataset,
    output_path: &Path,
    window: &RasterWindow,
) -> FixtureResult<()> {
    let transform = GeoTransform::from(source.geo_transform()?).window_transform(window);
    let band_count = source.raster_count();

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<T, _>(
        output_path,
        window.cols as isize,
        window.rows as isize,
        band_count,
    )?;
    dataset.set_geo_transform(&transform.to_array())?;

    let projection = source.projection();
    if !projection.is_empty() {
        dataset.set_projection(&projection)?;
    }
    copy_metadata(source, &mut dataset)?;

    for band_index in 1..=band_count {
        let data = read_window::<T>(source, band_index, window)?;
        let nodata = source.rasterband(band_index)?.no_data_value();

        let mut band = dataset.rasterband(band_index)?;
        let buffer = Buffer::new((window.cols, window.rows), data.into_raw_vec());
        band.write((0, 0), (window.cols, window.rows), &buffer)?;
        if nodata.is_some() {
            band.set_no_data_value(nodata)?;
        }
    }

    Ok(())
}

/// Geotransform of a raster on disk
pub fn raster_transform<P: AsRef<Path>>(path: P) -> FixtureResult<GeoTransform> {
    let dataset = Dataset::open(path.as_ref())?;
    Ok(GeoTransform::from(dataset.geo_transform()?))
}

/// Copy default-domain `KEY=VALUE` metadata items
pub fn copy_metadata(source: &Dataset, target: &mut Dataset) -> FixtureResult<()> {
    for item in source.metadata_domain("").unwrap_or_default() {
        if let Some((key, value)) = item.split_once('=') {
            target.set_metadata_item(key, value, "")?;
        }
    }
    Ok(())
}
