use crate::config::AltimetryQueryParams;
use crate::types::{BoundingRegion, FixtureError, FixtureResult};
use arrow::array::{Array, AsArray, BooleanArray, RecordBatch};
use arrow::compute::{cast, concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use async_trait::async_trait;
use bytes::Bytes;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Primary elevation measurement column
pub const ELEVATION_COLUMN: &str = "h_li";
/// Quality summary flag, zero for the best measurements
pub const QUALITY_COLUMN: &str = "atl06_quality_summary";

/// Points along each region edge before reprojection
const EDGE_SAMPLES: usize = 50;

/// Geographic polygon vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

/// One point-cloud query against the altimetry service
#[derive(Debug, Clone, PartialEq)]
pub struct AltimetryRequest {
    pub polygon: Vec<LonLat>,
    pub params: AltimetryQueryParams,
}

#[derive(Serialize)]
struct OutputParms {
    format: &'static str,
    open_on_complete: bool,
    as_geo: bool,
}

#[derive(Serialize)]
struct RequestParms<'a> {
    poly: &'a [LonLat],
    srt: i32,
    cnf: i32,
    ats: f64,
    cnt: u32,
    t0: String,
    t1: String,
    output: OutputParms,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    parms: RequestParms<'a>,
}

impl AltimetryRequest {
    /// JSON body understood by the service
    pub fn to_json(&self) -> FixtureResult<serde_json::Value> {
        let time_format = "%Y-%m-%dT%H:%M:%SZ";
        let body = RequestBody {
            parms: RequestParms {
                poly: &self.polygon,
                srt: self.params.surface_type,
                cnf: self.params.confidence,
                ats: self.params.along_track_spread,
                cnt: self.params.min_count,
                t0: self.params.start_time.format(time_format).to_string(),
                t1: self.params.stop_time.format(time_format).to_string(),
                output: OutputParms {
                    format: "parquet",
                    open_on_complete: false,
                    as_geo: false,
                },
            },
        };
        Ok(serde_json::to_value(body)?)
    }
}

/// Remote point-altimetry query service
#[async_trait]
pub trait AltimetryService: Send + Sync {
    /// Run the query and return every matching point as one batch
    async fn query(&self, request: &AltimetryRequest) -> FixtureResult<RecordBatch>;
}

/// SlideRule ATL06 subsetting client
pub struct SlideRuleClient {
    client: reqwest::Client,
    base_url: String,
}

impl SlideRuleClient {
    pub fn new(base_url: impl Into<String>) -> FixtureResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("terrain-fixtures/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/arrow/atl06sp", self.base_url)
    }
}

#[async_trait]
impl AltimetryService for SlideRuleClient {
    async fn query(&self, request: &AltimetryRequest) -> FixtureResult<RecordBatch> {
        let url = self.endpoint();
        log::info!("Querying {} with {} polygon vertices", url, request.polygon.len());

        let response = self
            .client
            .post(&url)
            .json(&request.to_json()?)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(FixtureError::Remote(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url,
                message
            )));
        }

        let content = response.bytes().await?;
        log::debug!("Received {} bytes of point data", content.len());
        read_parquet_bytes(content)
    }
}

/// Decode a Parquet payload into a single batch
pub fn read_parquet_bytes(content: Bytes) -> FixtureResult<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(content)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Sample every region edge so curved edges survive reprojection
pub fn densified_boundary(region: &BoundingRegion, samples: usize) -> (Vec<f64>, Vec<f64>) {
    let samples = samples.max(2);
    let mut xs = Vec::with_capacity(samples * 4);
    let mut ys = Vec::with_capacity(samples * 4);

    for i in 0..samples {
        let t = i as f64 / (samples - 1) as f64;
        let x = region.west + t * (region.east - region.west);
        let y = region.south + t * (region.north - region.south);

        xs.extend([x, x, region.west, region.east]);
        ys.extend([region.south, region.north, y, y]);
    }

    (xs, ys)
}

/// Closed counter-clockwise ring around the extent of the given points
pub fn extent_polygon(lons: &[f64], lats: &[f64]) -> FixtureResult<Vec<LonLat>> {
    let finite = |values: &[f64]| -> Option<(f64, f64)> {
        values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    };

    let ((min_lon, max_lon), (min_lat, max_lat)) = match (finite(lons), finite(lats)) {
        (Some(lon), Some(lat)) => (lon, lat),
        _ => {
            return Err(FixtureError::Processing(
                "Region has no finite geographic coordinates".to_string(),
            ))
        }
    };

    Ok(vec![
        LonLat { lon: min_lon, lat: min_lat },
        LonLat { lon: max_lon, lat: min_lat },
        LonLat { lon: max_lon, lat: max_lat },
        LonLat { lon: min_lon, lat: max_lat },
        LonLat { lon: min_lon, lat: min_lat },
    ])
}

/// Geographic (EPSG:4326) query polygon for a projected region
pub fn query_polygon(region: &BoundingRegion) -> FixtureResult<Vec<LonLat>> {
    let source = SpatialRef::from_epsg(region.epsg)?;
    let target = SpatialRef::from_epsg(4326)?;
    source.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    target.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

    let transform = CoordTransform::new(&source, &target)?;
    let (mut xs, mut ys) = densified_boundary(region, EDGE_SAMPLES);
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    let polygon = extent_polygon(&xs, &ys)?;
    log::debug!("Query polygon: {:?}", polygon);
    Ok(polygon)
}

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> FixtureResult<&'a dyn Array> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| FixtureError::InvalidFormat(format!("Point data has no {} column", name)))
}

/// Keep rows with a finite elevation and a zero quality flag
pub fn filter_points(batch: &RecordBatch) -> FixtureResult<RecordBatch> {
    let elevation = cast(required_column(batch, ELEVATION_COLUMN)?, &DataType::Float64)?;
    let quality = cast(required_column(batch, QUALITY_COLUMN)?, &DataType::Int64)?;
    let elevation = elevation.as_primitive::<Float64Type>();
    let quality = quality.as_primitive::<Int64Type>();

    let keep: BooleanArray = (0..batch.num_rows())
        .map(|i| {
            let finite = elevation.is_valid(i) && elevation.value(i).is_finite();
            let best = quality.is_valid(i) && quality.value(i) == 0;
            Some(finite && best)
        })
        .collect();

    let filtered = filter_record_batch(batch, &keep)?;
    log::info!(
        "Kept {} of {} points after elevation and quality filtering",
        filtered.num_rows(),
        batch.num_rows()
    );
    Ok(filtered)
}

/// Persist a batch as a single Parquet file
pub fn write_point_cloud<P: AsRef<Path>>(batch: &RecordBatch, path: P) -> FixtureResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    log::info!("Saved {}", path.as_ref().display());
    Ok(())
}
