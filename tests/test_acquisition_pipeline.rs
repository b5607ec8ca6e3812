use arrow::array::{Array, AsArray, Float32Array, Int8Array};
use arrow::datatypes::{DataType, Field, Float32Type, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, Geometry, LayerAccess, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DriverManager, LayerOptions, Metadata};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use terrain_fixtures::config::{AcquisitionConfig, AltimetryQueryParams};
use terrain_fixtures::io::{AltimetryRequest, AltimetryService, RemoteFetcher};
use terrain_fixtures::{
    AcquisitionOutcome, BoundingRegion, DatasetDescriptor, DatasetKind, ExampleDataPipeline,
    FixtureError, FixtureResult, SourceLocator,
};
use zip::write::FileOptions;

const DEM_URL: &str = "https://data.example.org/dtm/NP_TEST_DTM20.zip";
const DEM_MEMBER: &str = "NP_TEST_DTM20/TEST_DTM20.tif";
const OUTLINES_URL: &str = "https://data.example.org/outlines/GAO_TEST.zip";

/// Serves canned payloads and counts every fetch
#[derive(Default)]
struct FakeFetcher {
    payloads: HashMap<String, Bytes>,
    failing_url: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FixtureResult<NamedTempFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_url.as_deref() == Some(url) {
            return Err(FixtureError::Remote(format!("HTTP 503: {}", url)));
        }
        let payload = self
            .payloads
            .get(url)
            .ok_or_else(|| FixtureError::Remote(format!("HTTP 404: {}", url)))?;

        let mut staged = NamedTempFile::new()?;
        staged.write_all(payload)?;
        Ok(staged)
    }
}

struct FakeAltimetry {
    calls: AtomicUsize,
}

#[async_trait]
impl AltimetryService for FakeAltimetry {
    async fn query(&self, request: &AltimetryRequest) -> FixtureResult<RecordBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.polygon.len(), 5);

        let schema = Schema::new(vec![
            Field::new("h_li", DataType::Float32, true),
            Field::new("atl06_quality_summary", DataType::Int8, true),
        ]);
        Ok(RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Float32Array::from(vec![
                    Some(231.5),
                    Some(f32::NAN),
                    Some(402.0),
                    None,
                    Some(18.75),
                ])),
                Arc::new(Int8Array::from(vec![Some(0), Some(0), Some(1), Some(0), Some(0)])),
            ],
        )?)
    }
}

fn zip_files(entries: &[(String, Vec<u8>)]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(name.as_str(), FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// 100x100 Int16 two-band DEM at 20 m, upper-left corner at (500000, 8680000)
fn dem_archive(workdir: &Path) -> Bytes {
    let path = workdir.join("source_dem.tif");
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<i16, _>(&path, 100, 100, 2)
        .unwrap();
    dataset
        .set_geo_transform(&[500000.0, 20.0, 0.0, 8680000.0, 0.0, -20.0])
        .unwrap();
    let srs = SpatialRef::from_epsg(25833).unwrap();
    dataset.set_projection(&srs.to_wkt().unwrap()).unwrap();
    dataset.set_metadata_item("AREA_OR_POINT", "Area", "").unwrap();

    for band_index in 1..=2isize {
        let values: Vec<i16> = (0..100 * 100)
            .map(|i| ((i / 100) * 100 + i % 100) as i16 + band_index as i16)
            .collect();
        let mut band = dataset.rasterband(band_index).unwrap();
        band.write((0, 0), (100, 100), &Buffer::new((100, 100), values))
            .unwrap();
        band.set_no_data_value(Some(-32767.0)).unwrap();
    }
    drop(dataset);

    zip_files(&[(DEM_MEMBER.to_string(), std::fs::read(&path).unwrap())])
}

/// Two glacier polygons with text, real and date attributes, zipped under a
/// sub-directory
fn outlines_archive(workdir: &Path) -> Bytes {
    let dir = workdir.join("outlines_src");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("GAO_TEST.shp");

    let driver = DriverManager::get_driver_by_name("ESRI Shapefile").unwrap();
    let mut dataset = driver.create_vector_only(&path).unwrap();
    let srs = SpatialRef::from_epsg(25833).unwrap();
    let mut layer = dataset
        .create_layer(LayerOptions {
            name: "GAO_TEST",
            srs: Some(&srs),
            ty: OGRwkbGeometryType::wkbPolygon,
            options: None,
        })
        .unwrap();
    layer
        .create_defn_fields(&[
            ("NAME", OGRFieldType::OFTString),
            ("AREA", OGRFieldType::OFTReal),
            ("SURVEYED", OGRFieldType::OFTDate),
        ])
        .unwrap();

    let surveyed = chrono::NaiveDate::from_ymd_opt(1990, 8, 1).unwrap();
    for (name, area, x0) in [("Longyearbreen", 2.5, 510000.0), ("Larsbreen", 3.75, 512000.0)] {
        let wkt = format!(
            "POLYGON (({x0} 8660000,{x1} 8660000,{x1} 8661000,{x0} 8661000,{x0} 8660000))",
            x0 = x0,
            x1 = x0 + 1000.0
        );
        layer
            .create_feature_fields(
                Geometry::from_wkt(&wkt).unwrap(),
                &["NAME", "AREA", "SURVEYED"],
                &[
                    FieldValue::StringValue(name.to_string()),
                    FieldValue::RealValue(area),
                    FieldValue::DateValue(surveyed),
                ],
            )
            .unwrap();
    }
    drop(layer);
    drop(dataset);

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&dir).unwrap() {
        let entry = entry.unwrap();
        let name = format!("GAO_TEST/{}", entry.file_name().to_string_lossy());
        entries.push((name, std::fs::read(entry.path()).unwrap()));
    }
    entries.sort();
    zip_files(&entries)
}

fn test_config(data_dir: &Path) -> AcquisitionConfig {
    let site = data_dir.join("Site");
    AcquisitionConfig {
        bundle: vec![
            DatasetDescriptor::new(
                "site_ref_dem",
                site.join("DEM_ref.tif"),
                Some(SourceLocator::parse(&format!("zip+{}!{}", DEM_URL, DEM_MEMBER)).unwrap()),
                DatasetKind::Raster,
            ),
            DatasetDescriptor::new(
                "site_outlines",
                site.join("glacier_mask/outlines.shp"),
                Some(SourceLocator::new(OUTLINES_URL)),
                DatasetKind::Outlines,
            ),
        ],
        point_cloud: DatasetDescriptor::new(
            "site_epc",
            site.join("EPC.parquet"),
            None,
            DatasetKind::PointCloud,
        ),
        region: BoundingRegion::new(500100.0, 500500.0, 8679000.0, 8679800.0, 25833),
        altimetry: AltimetryQueryParams::default(),
        altimetry_url: "http://localhost".to_string(),
    }
}

struct Harness {
    _workdir: TempDir,
    data_dir: TempDir,
    fetcher: Arc<FakeFetcher>,
    altimetry: Arc<FakeAltimetry>,
    pipeline: ExampleDataPipeline,
}

fn parquet_rows(path: &Path) -> (usize, Vec<f32>) {
    let file = std::fs::File::open(path).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
    let rows = batches.iter().map(|b| b.num_rows()).sum();
    let heights = batches
        .iter()
        .flat_map(|b| {
            let column = b.column_by_name("h_li").unwrap().as_primitive::<Float32Type>();
            assert_eq!(column.null_count(), 0);
            column.values().to_vec()
        })
        .collect();
    (rows, heights)
}

fn harness(failing_url: Option<&str>) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let workdir = TempDir::new().unwrap();
    let data_dir = TempDir::new().unwrap();

    let mut payloads = HashMap::new();
    payloads.insert(DEM_URL.to_string(), dem_archive(workdir.path()));
    payloads.insert(OUTLINES_URL.to_string(), outlines_archive(workdir.path()));

    let fetcher = Arc::new(FakeFetcher {
        payloads,
        failing_url: failing_url.map(str::to_string),
        calls: AtomicUsize::new(0),
    });
    let altimetry = Arc::new(FakeAltimetry { calls: AtomicUsize::new(0) });
    let pipeline = ExampleDataPipeline::new(
        test_config(data_dir.path()),
        fetcher.clone(),
        altimetry.clone(),
    );

    Harness {
        _workdir: workdir,
        data_dir,
        fetcher,
        altimetry,
        pipeline,
    }
}

#[tokio::test]
async fn test_bundle_crops_and_coerces() {
    let h = harness(None);

    let outcome = h.pipeline.ensure_raster_dataset_bundle(false).await.unwrap();
    println!("Outcome: {:?}", outcome);
    assert!(outcome.was_fetched());
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);

    let dem_path = h.data_dir.path().join("Site/DEM_ref.tif");
    let dem = Dataset::open(&dem_path).unwrap();
    assert_eq!(dem.raster_size(), (20, 40));
    assert_eq!(dem.raster_count(), 2);
    assert_eq!(
        dem.geo_transform().unwrap(),
        [500100.0, 20.0, 0.0, 8679800.0, 0.0, -20.0]
    );
    assert!(dem.projection().contains("25833"));
    assert_eq!(dem.metadata_item("AREA_OR_POINT", "").as_deref(), Some("Area"));

    let band = dem.rasterband(2).unwrap();
    assert_eq!(band.no_data_value(), Some(-32767.0));
    let corner = band.read_as::<i16>((0, 0), (1, 1), (1, 1), None).unwrap();
    // source row 10, column 5, band 2
    assert_eq!(corner.data[0], 10 * 100 + 5 + 2);

    let outlines = Dataset::open(h.data_dir.path().join("Site/glacier_mask/outlines.shp")).unwrap();
    let mut layer = outlines.layer(0).unwrap();
    assert_eq!(layer.feature_count(), 2);

    let surveyed = layer
        .defn()
        .fields()
        .find(|f| f.name() == "SURVEYED")
        .unwrap();
    assert_eq!(surveyed.field_type(), OGRFieldType::OFTString);
    let area = layer.defn().fields().find(|f| f.name() == "AREA").unwrap();
    assert_eq!(area.field_type(), OGRFieldType::OFTReal);

    let feature = layer.features().next().unwrap();
    assert_eq!(
        feature.field("SURVEYED").unwrap(),
        Some(FieldValue::StringValue("1990-08-01".to_string()))
    );
    assert!(feature.geometry().is_some());
}

#[tokio::test]
async fn test_bundle_is_idempotent() {
    let h = harness(None);

    h.pipeline.ensure_raster_dataset_bundle(false).await.unwrap();
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);

    let outcome = h.pipeline.ensure_raster_dataset_bundle(false).await.unwrap();
    assert_eq!(outcome, AcquisitionOutcome::AlreadyPresent);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);

    let outcome = h.pipeline.ensure_raster_dataset_bundle(true).await.unwrap();
    assert!(outcome.was_fetched());
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_partial_bundle_is_refetched() {
    let h = harness(None);

    h.pipeline.ensure_raster_dataset_bundle(false).await.unwrap();
    std::fs::remove_file(h.data_dir.path().join("Site/DEM_ref.tif")).unwrap();

    let outcome = h.pipeline.ensure_raster_dataset_bundle(false).await.unwrap();
    match outcome {
        AcquisitionOutcome::Fetched(paths) => assert_eq!(paths.len(), 2),
        other => panic!("expected a fetch, got {:?}", other),
    }
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_bundle_propagates_first_error() {
    let h = harness(Some(OUTLINES_URL));

    let result = h.pipeline.ensure_raster_dataset_bundle(false).await;
    match result {
        Err(FixtureError::Remote(message)) => assert!(message.contains(OUTLINES_URL)),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert!(!h
        .data_dir
        .path()
        .join("Site/glacier_mask/outlines.shp")
        .exists());
}

#[tokio::test]
async fn test_point_cloud_is_filtered_and_skipped() {
    let h = harness(None);

    let outcome = h.pipeline.ensure_point_cloud_dataset(false).await.unwrap();
    assert!(outcome.was_fetched());
    assert_eq!(h.altimetry.calls.load(Ordering::SeqCst), 1);

    let path = h.data_dir.path().join("Site/EPC.parquet");
    let (rows, heights) = parquet_rows(&path);
    assert_eq!(rows, 2);
    assert_eq!(heights, vec![231.5, 18.75]);

    let outcome = h.pipeline.ensure_point_cloud_dataset(false).await.unwrap();
    assert_eq!(outcome, AcquisitionOutcome::AlreadyPresent);
    assert_eq!(h.altimetry.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_point_cloud_overwrite_requeries() {
    let h = harness(None);

    let path = h.data_dir.path().join("Site/EPC.parquet");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"stale").unwrap();

    let outcome = h.pipeline.ensure_point_cloud_dataset(false).await.unwrap();
    assert_eq!(outcome, AcquisitionOutcome::AlreadyPresent);
    assert_eq!(h.altimetry.calls.load(Ordering::SeqCst), 0);

    let outcome = h.pipeline.ensure_point_cloud_dataset(true).await.unwrap();
    assert_eq!(outcome, AcquisitionOutcome::Fetched(vec![path.clone()]));
    assert_eq!(h.altimetry.calls.load(Ordering::SeqCst), 1);

    let outcome = h.pipeline.ensure_point_cloud_dataset(true).await.unwrap();
    assert!(outcome.was_fetched());
    assert_eq!(h.altimetry.calls.load(Ordering::SeqCst), 2);

    let (rows, heights) = parquet_rows(&path);
    assert_eq!(rows, 2);
    assert_eq!(heights, vec![231.5, 18.75]);
}
