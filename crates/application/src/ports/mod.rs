mod hot_domains;
mod ranking;
mod upstream;

pub use hot_domains::HotDomainTracker;
pub use ranking::{RankedAddresses, RttRanker};
pub use upstream::Upstream;
