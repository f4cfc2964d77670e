mod auth_extractor;
mod json_body;
mod tracing_layer;
mod metrics_layer;

pub use auth_extractor::*;
pub use json_body::OptionalJson;
pub use tracing_layer::*;
pub use metrics_layer::*;
