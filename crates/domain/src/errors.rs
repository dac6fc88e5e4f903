use super::rcode::ResponseCode;
use thiserror::Error;

/// `Clone` is load-bearing: the request deduplicator fans a single outcome
/// (success or failure) out to every collapsed waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("No upstream servers configured")]
    NoUpstreamServers,

    #[error("All upstream servers failed")]
    AllServersFailed,

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Upstream returned {0}")]
    UpstreamRcode(ResponseCode),

    #[error("Empty response: no records found")]
    EmptyResponse,

    #[error("Sort queue is full")]
    SortQueueFull,

    #[error("Sort queue is closed")]
    SortQueueClosed,

    #[error("Sort task cancelled")]
    SortCancelled,

    #[error("RTT ranking failed: {0}")]
    RankingFailed(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Transport-class failures (timeouts, refused/reset connections) as
    /// opposed to DNS-semantic outcomes. Drives the racing early trigger and
    /// the "never cache transient failures" rule.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            DomainError::QueryTimeout | DomainError::Transport(_)
        )
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::IoError(err.to_string())
    }
}
