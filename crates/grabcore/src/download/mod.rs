//! Download pipeline: probe, fetch with fallback, deliver

pub mod artifact;
pub mod builder;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod request;
pub mod resolver;
pub mod sink;
pub mod upload;

// Re-exports for convenience
pub use error::DownloadError;
pub use executor::{FetchExecutor, FetchOutcome, FetchPlan, Fetcher};
pub use orchestrator::{Delivery, Orchestrator};
pub use probe::{Prober, QualityOption};
pub use request::{DownloadRequest, MediaKind};
pub use resolver::{CurlRedirectResolver, UrlResolver};
pub use sink::{LogSink, UpdateSink};
pub use upload::{DeliveryMode, Uploader};
