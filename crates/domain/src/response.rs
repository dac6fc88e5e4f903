use super::dns_record::{DnsRecord, RecordData};
use super::rcode::ResponseCode;
use std::net::IpAddr;

/// What an upstream exchange yields once the transport layer has parsed the
/// wire message. Answer and authority sections are kept separate because
/// negative-TTL derivation reads the authority SOA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub rcode: ResponseCode,
    pub answers: Vec<DnsRecord>,
    pub authority: Vec<DnsRecord>,
    /// DNSSEC AD flag: the upstream validated this response.
    pub authenticated: bool,
}

impl UpstreamResponse {
    pub fn empty(rcode: ResponseCode) -> Self {
        Self {
            rcode,
            answers: Vec::new(),
            authority: Vec::new(),
            authenticated: false,
        }
    }

    pub fn with_answers(answers: Vec<DnsRecord>) -> Self {
        Self {
            rcode: ResponseCode::NoError,
            answers,
            authority: Vec::new(),
            authenticated: false,
        }
    }

    pub fn is_nxdomain(&self) -> bool {
        self.rcode.is_definitive_negative()
    }

    pub fn addresses(&self) -> Vec<IpAddr> {
        self.answers.iter().filter_map(|r| r.data.as_ip()).collect()
    }

    /// Minimum TTL across answer and authority records, or `None` when the
    /// response carries no records at all.
    pub fn min_ttl(&self) -> Option<u32> {
        self.answers
            .iter()
            .chain(self.authority.iter())
            .map(|r| r.ttl)
            .min()
    }

    /// Negative-cache TTL for NXDOMAIN/NODATA responses: the authority SOA's
    /// MINIMUM capped by the SOA record's own TTL (RFC 2308), or the given
    /// default when no SOA is present.
    pub fn negative_ttl(&self, default_secs: u32) -> u32 {
        for record in &self.authority {
            if let RecordData::Soa { minimum, .. } = record.data {
                return minimum.min(record.ttl);
            }
        }
        default_secs
    }
}
