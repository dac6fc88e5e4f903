use super::record_type::RecordType;
use std::fmt;
use std::sync::Arc;

/// A single question as the orchestrator and cache see it. Domains are
/// normalized (lowercased, no trailing dot) by the server layer before they
/// reach this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsQuestion {
    pub domain: Arc<str>,
    pub record_type: RecordType,
    /// EDNS DO bit: the client asked for DNSSEC records.
    pub dnssec_ok: bool,
}

impl DnsQuestion {
    pub fn new(domain: impl Into<Arc<str>>, record_type: RecordType) -> Self {
        Self {
            domain: domain.into(),
            record_type,
            dnssec_ok: false,
        }
    }

    pub fn with_dnssec(mut self, dnssec_ok: bool) -> Self {
        self.dnssec_ok = dnssec_ok;
        self
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.record_type)
    }
}
