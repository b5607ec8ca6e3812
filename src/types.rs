use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rectangular region in a projected coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
    /// EPSG code of the projected CRS the edges are expressed in
    pub epsg: u32,
}

impl BoundingRegion {
    pub fn new(west: f64, east: f64, south: f64, north: f64, epsg: u32) -> Self {
        Self { west, east, south, north, epsg }
    }

    /// North-west corner as (x, y)
    pub fn upper_left(&self) -> (f64, f64) {
        (self.west, self.north)
    }

    /// South-east corner as (x, y)
    pub fn lower_right(&self) -> (f64, f64) {
        (self.east, self.south)
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// GDAL coefficient order
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Absolute pixel size as (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Row/column of the pixel containing the georeferenced point.
    ///
    /// Uses floor semantics, so a point on a pixel edge belongs to the pixel
    /// to its lower-right.
    pub fn index(&self, x: f64, y: f64) -> (i64, i64) {
        let col = ((x - self.top_left_x) / self.pixel_width).floor() as i64;
        let row = ((y - self.top_left_y) / self.pixel_height).floor() as i64;
        (row, col)
    }

    /// Transform of a window starting at the given pixel offset
    pub fn window_transform(&self, window: &RasterWindow) -> GeoTransform {
        let col = window.col_off as f64;
        let row = window.row_off as f64;
        GeoTransform {
            top_left_x: self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            top_left_y: self.top_left_y + col * self.rotation_y + row * self.pixel_height,
            ..*self
        }
    }

    /// Same grid moved by a georeferenced offset
    pub fn shifted(&self, x_offset: f64, y_offset: f64) -> GeoTransform {
        GeoTransform {
            top_left_x: self.top_left_x + x_offset,
            top_left_y: self.top_left_y + y_offset,
            ..*self
        }
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(gt: [f64; 6]) -> Self {
        GeoTransform {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Pixel-space window of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Where a dataset comes from: an archive URL and, for zip archives, the
/// member to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocator {
    pub url: String,
    pub member: Option<String>,
}

impl SourceLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), member: None }
    }

    /// Parse `zip+https://host/archive.zip!member/file.tif` style locators.
    /// Anything without the `zip+` scheme prefix is a plain URL.
    pub fn parse(locator: &str) -> FixtureResult<Self> {
        let Some(rest) = locator.strip_prefix("zip+") else {
            return Ok(Self::new(locator));
        };

        match rest.split_once('!') {
            Some((url, member)) if !url.is_empty() && !member.is_empty() => Ok(Self {
                url: url.to_string(),
                member: Some(member.trim_start_matches('/').to_string()),
            }),
            Some(_) => Err(FixtureError::InvalidFormat(format!(
                "Malformed zip locator: {}",
                locator
            ))),
            None => Ok(Self::new(rest)),
        }
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.member {
            Some(member) => write!(f, "zip+{}!{}", self.url, member),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Kind of artifact a dataset is persisted as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Cropped GeoTIFF
    Raster,
    /// Vector outlines, format chosen by extension
    Outlines,
    /// Parquet point cloud from the altimetry service
    PointCloud,
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetKind::Raster => write!(f, "raster"),
            DatasetKind::Outlines => write!(f, "outlines"),
            DatasetKind::PointCloud => write!(f, "point cloud"),
        }
    }
}

/// A named example dataset and where it lives locally and remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub source: Option<SourceLocator>,
    pub kind: DatasetKind,
}

impl DatasetDescriptor {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: Option<SourceLocator>,
        kind: DatasetKind,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source,
            kind,
        }
    }

    /// A dataset counts as acquired as soon as its file exists
    pub fn is_present(&self) -> bool {
        self.path.is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of an ensure-dataset call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// Every target file already existed; nothing was fetched
    AlreadyPresent,
    /// These files were (re)written
    Fetched(Vec<PathBuf>),
}

impl AcquisitionOutcome {
    pub fn was_fetched(&self) -> bool {
        matches!(self, AcquisitionOutcome::Fetched(_))
    }
}

/// Error types for data acquisition and ground-truth generation
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Toolkit command `{command}` failed ({status}): {stderr}")]
    Toolkit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Result type for acquisition and generation operations
pub type FixtureResult<T> = Result<T, FixtureError>;

/// Shortest round-trip decimal that keeps a fractional part for whole
/// numbers (`2.0`, `-24.0`, `0.5`)
pub fn decimal_string(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
