pub mod config;
pub mod error;
pub mod experiments;
pub mod logging;
pub mod types;

pub use config::{AssignmentStrategy, EngineConfig};
pub use error::{ExperimentError, Result};
pub use experiments::{
    apply_variant, ExperimentStore, MetricsEvent, Test, TestDefinition, TestStatus,
    VariantDefinition,
};
pub use types::FormDocument;
