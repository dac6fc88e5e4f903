use super::record_type::RecordType;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Record payload as a closed sum type. The transport layer (external) maps
/// wire rdata into these variants; record types outside the accelerator's
/// interest are carried opaquely in their presentation form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(Arc<str>),
    Soa {
        mname: Arc<str>,
        rname: Arc<str>,
        serial: u32,
        minimum: u32,
    },
    Other {
        record_type: RecordType,
        rdata: Arc<str>,
    },
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::AAAA,
            RecordData::Cname(_) => RecordType::CNAME,
            RecordData::Soa { .. } => RecordType::SOA,
            RecordData::Other { record_type, .. } => *record_type,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            RecordData::A(addr) => Some(IpAddr::V4(*addr)),
            RecordData::Aaaa(addr) => Some(IpAddr::V6(*addr)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: Arc<str>,
    pub ttl: u32,
    pub data: RecordData,
}

impl DnsRecord {
    pub fn new(name: impl Into<Arc<str>>, ttl: u32, data: RecordData) -> Self {
        Self {
            name: name.into(),
            ttl,
            data,
        }
    }

    pub fn a(name: impl Into<Arc<str>>, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, ttl, RecordData::A(addr))
    }

    pub fn aaaa(name: impl Into<Arc<str>>, ttl: u32, addr: Ipv6Addr) -> Self {
        Self::new(name, ttl, RecordData::Aaaa(addr))
    }

    pub fn cname(name: impl Into<Arc<str>>, ttl: u32, target: impl Into<Arc<str>>) -> Self {
        Self::new(name, ttl, RecordData::Cname(target.into()))
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    /// Identity used when merging responses from several upstreams: the
    /// address for A/AAAA, the target for CNAME, and the full presentation
    /// form for everything else. The last case is a string-equality
    /// heuristic, not a canonical comparison.
    pub fn natural_key(&self) -> String {
        match &self.data {
            RecordData::A(addr) => addr.to_string(),
            RecordData::Aaaa(addr) => addr.to_string(),
            RecordData::Cname(target) => target.to_string(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            RecordData::A(addr) => write!(f, "{} {} A {}", self.name, self.ttl, addr),
            RecordData::Aaaa(addr) => write!(f, "{} {} AAAA {}", self.name, self.ttl, addr),
            RecordData::Cname(target) => {
                write!(f, "{} {} CNAME {}", self.name, self.ttl, target)
            }
            RecordData::Soa {
                mname,
                rname,
                serial,
                minimum,
            } => write!(
                f,
                "{} {} SOA {} {} {} {}",
                self.name, self.ttl, mname, rname, serial, minimum
            ),
            RecordData::Other { record_type, rdata } => {
                write!(f, "{} {} {} {}", self.name, self.ttl, record_type, rdata)
            }
        }
    }
}
