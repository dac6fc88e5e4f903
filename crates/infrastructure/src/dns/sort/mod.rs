mod coordinator;
mod queue;

pub use coordinator::SortingCoordinator;
pub use queue::{SortQueue, SortTask};
