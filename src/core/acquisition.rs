use crate::config::AcquisitionConfig;
use crate::io::altimetry::{self, AltimetryRequest, AltimetryService};
use crate::io::fetch::{self, RemoteFetcher};
use crate::io::{raster, vector};
use crate::types::{
    AcquisitionOutcome, DatasetDescriptor, DatasetKind, FixtureError, FixtureResult, SourceLocator,
};
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Makes sure the example datasets of a configuration exist locally
pub struct ExampleDataPipeline {
    config: AcquisitionConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    altimetry: Arc<dyn AltimetryService>,
}

impl ExampleDataPipeline {
    pub fn new(
        config: AcquisitionConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        altimetry: Arc<dyn AltimetryService>,
    ) -> Self {
        Self {
            config,
            fetcher,
            altimetry,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Fetch, crop and persist the raster/outline bundle unless every file
    /// already exists.
    ///
    /// Members are fetched concurrently; the first failure is returned and
    /// the remaining fetches are dropped.
    pub async fn ensure_raster_dataset_bundle(
        &self,
        overwrite: bool,
    ) -> FixtureResult<AcquisitionOutcome> {
        if !overwrite && self.config.bundle.iter().all(DatasetDescriptor::is_present) {
            log::info!("Datasets already present");
            return Ok(AcquisitionOutcome::AlreadyPresent);
        }

        log::info!("Downloading {} example datasets", self.config.bundle.len());
        for dir in self.config.bundle_directories() {
            std::fs::create_dir_all(&dir)?;
        }

        let tasks = self.config.bundle.iter().map(|dataset| self.acquire(dataset));
        let paths = try_join_all(tasks).await?;

        Ok(AcquisitionOutcome::Fetched(paths))
    }

    /// Query, filter and persist the altimetry point cloud unless it exists
    pub async fn ensure_point_cloud_dataset(
        &self,
        overwrite: bool,
    ) -> FixtureResult<AcquisitionOutcome> {
        let dataset = &self.config.point_cloud;
        if !overwrite && dataset.is_present() {
            log::info!("Point cloud dataset {} already present", dataset.name);
            return Ok(AcquisitionOutcome::AlreadyPresent);
        }

        log::info!("Downloading point cloud dataset {}", dataset.name);
        if let Some(parent) = dataset.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let request = AltimetryRequest {
            polygon: altimetry::query_polygon(&self.config.region)?,
            params: self.config.altimetry.clone(),
        };
        let points = self.altimetry.query(&request).await?;
        let filtered = altimetry::filter_points(&points)?;
        altimetry::write_point_cloud(&filtered, &dataset.path)?;

        Ok(AcquisitionOutcome::Fetched(vec![dataset.path.clone()]))
    }

    async fn acquire(&self, dataset: &DatasetDescriptor) -> FixtureResult<PathBuf> {
        let source = dataset.source.as_ref().ok_or_else(|| {
            FixtureError::InvalidFormat(format!("Dataset {} has no remote source", dataset.name))
        })?;

        let download = self.fetcher.fetch(&source.url).await?;
        log::debug!("Fetched {} for {}", source, dataset.name);

        match dataset.kind {
            DatasetKind::Raster => {
                let staged = stage_raster(download, source)?;
                raster::crop_raster(staged.path(), &dataset.path, &self.config.region)?;
            }
            DatasetKind::Outlines => {
                let unpacked = fetch::extract_archive(download.path())?;
                let shapefile = match &source.member {
                    Some(member) => unpacked.path().join(member),
                    None => fetch::find_with_extension(unpacked.path(), "shp")?.ok_or_else(|| {
                        FixtureError::InvalidFormat(format!("No shapefile in {}", source.url))
                    })?,
                };
                vector::transform_outlines(&shapefile, &dataset.path)?;
            }
            DatasetKind::PointCloud => {
                return Err(FixtureError::InvalidFormat(format!(
                    "Dataset {} is a point cloud and cannot be fetched as an archive",
                    dataset.name
                )));
            }
        }

        Ok(dataset.path.clone())
    }
}

/// Put a downloaded raster where the raster driver can open it
fn stage_raster(download: NamedTempFile, source: &SourceLocator) -> FixtureResult<NamedTempFile> {
    if let Some(member) = &source.member {
        return fetch::extract_member(download.path(), member);
    }
    if fetch::is_zip_file(download.path())? {
        return Err(FixtureError::InvalidFormat(format!(
            "{} is a zip archive but no member was given",
            source.url
        )));
    }
    Ok(download)
}
