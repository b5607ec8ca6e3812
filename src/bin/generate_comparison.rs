//! Terrain attributes plus shifted and resampled copies of the reference DEM

use terrain_fixtures::config::GroundTruthConfig;
use terrain_fixtures::{GdalToolkit, GroundTruthRunner};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GroundTruthConfig::default();
    let runner = GroundTruthRunner::new(GdalToolkit::new());
    let outputs = runner.generate_comparison(&config.source, &config.output_dir)?;

    for output in &outputs {
        log::debug!("{}", output.display());
    }
    log::info!(
        "Wrote {} rasters to {}",
        outputs.len(),
        config.output_dir.display()
    );
    Ok(())
}
