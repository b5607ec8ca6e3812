//! Dataset acquisition and ground-truth generation

pub mod acquisition;
pub mod ground_truth;
pub mod toolkit;

// Re-export main types
pub use acquisition::ExampleDataPipeline;
pub use ground_truth::{
    comparison_shifts, DemAlgorithm, DemProcessing, GroundTruthJob, GroundTruthRunner,
    Illumination, PixelShift, GROUND_TRUTH_CATALOG,
};
pub use toolkit::{GdalToolkit, TerrainToolkit};
