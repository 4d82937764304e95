pub mod metrics;
pub mod layer;

#[cfg(feature = "tracing-basic")]
pub mod subscriber;

pub use metrics::{LiveMetrics, MetricsSnapshot};
pub use layer::{BoxStream, ObservabilityLayer};

#[cfg(feature = "tracing-basic")]
pub use subscriber::init_tracing;
