pub mod apply;
pub mod assignment;
pub mod config;
pub mod metrics;
pub mod modification;
pub mod report;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use apply::{apply_modifications, apply_variant};
pub use config::{Test, TestDefinition, TestStatus, Variant, VariantDefinition};
pub use metrics::{MetricsEvent, VariantResult};
pub use modification::Modification;
pub use store::ExperimentStore;
