pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod stats;
pub mod store;
pub mod table;

pub use error::{PipelineError, SchemaMismatch, StoreError};
pub use pipeline::SensorPipeline;
pub use registry::{SensorQuerySpec, SensorRegistry};
pub use table::{NormalizedReading, NormalizedTable};
