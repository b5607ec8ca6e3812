//! Fetch the Longyearbyen example datasets into `data/`

use std::sync::Arc;
use terrain_fixtures::config::AcquisitionConfig;
use terrain_fixtures::io::{HttpFetcher, SlideRuleClient};
use terrain_fixtures::ExampleDataPipeline;

const DATA_DIR: &str = "data";
const OVERWRITE_LONGYEARBYEN_DEM: bool = false;
const OVERWRITE_LONGYEARBYEN_EPC: bool = false;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AcquisitionConfig::longyearbyen(DATA_DIR)?;
    let altimetry = SlideRuleClient::new(config.altimetry_url.clone())?;
    let pipeline = ExampleDataPipeline::new(
        config,
        Arc::new(HttpFetcher::new()?),
        Arc::new(altimetry),
    );

    let bundle = pipeline
        .ensure_raster_dataset_bundle(OVERWRITE_LONGYEARBYEN_DEM)
        .await?;
    log::info!("Raster bundle: {:?}", bundle);

    let points = pipeline
        .ensure_point_cloud_dataset(OVERWRITE_LONGYEARBYEN_EPC)
        .await?;
    log::info!("Point cloud: {:?}", points);

    Ok(())
}
