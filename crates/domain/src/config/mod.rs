mod cache;
mod health;
mod sorting;
mod upstream;

pub use cache::CacheConfig;
pub use health::HealthCheckConfig;
pub use sorting::SortConfig;
pub use upstream::{UpstreamConfig, UpstreamStrategy};
