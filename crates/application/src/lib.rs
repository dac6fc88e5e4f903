pub mod ports;

pub use ports::{HotDomainTracker, RankedAddresses, RttRanker, Upstream};
