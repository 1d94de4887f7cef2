use enum_iterator::Sequence;
use packed_struct::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Display;

#[derive(Debug, Eq, PartialEq, PrimitiveEnum_u8, Copy, Clone)]
/// A four bit field that specifies kind of query in this message.
/// This value is set by the originator of a query and copied into the response.
pub enum OpCode {
    /// A standard query (QUERY)
    Query = 0,
    // IQuery = 1, an inverse query (IQUERY) - obsolete in https://www.rfc-editor.org/rfc/rfc3425
    /// Server status request (STATUS)
    Status = 2,
    /// 3-15            reserved for future use
    Reserved = 15,
}

impl From<u8> for OpCode {
    fn from(input: u8) -> Self {
        match input {
            0 => Self::Query,
            2 => Self::Status,
            _ => Self::Reserved,
        }
    }
}

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Eq, PartialEq)]
/// Response code, things like NOERROR, FORMATERROR, SERVFAIL etc.
pub enum Rcode {
    // No error condition
    NoError = 0,
    // Format error - The name server was unable to interpret the query.
    FormatError = 1,
    // Server failure - The name server was unable to process this query due to a problem with the name server.
    ServFail = 2,
    /// Name Error - Meaningful only for responses from an authoritative name server, this code signifies that the domain name referenced in the query does not exist.
    NameError = 3,
    /// Not Implemented - The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// Refused - The name server refuses to perform the specified operation for policy reasons.
    Refused = 5,
    // 6..15 - Reserved for future use
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
/// RRType, eg A, PTR, SRV etc. The set a query can ask for; on the
/// decode side anything else is carried as raw bytes with the numeric
/// code on the record wrapper.
pub enum RecordType {
    /// A host address
    A = 1,
    /// Authoritative name server
    NS = 2,
    CNAME = 5, // 5 the canonical name for an alias
    SOA = 6,   // 6 marks the start of a zone of authority
    /// A domain name pointer - the backbone of mDNS service discovery
    PTR = 12,
    /// Text strings
    TXT = 16,
    /// IPv6 Records <https://www.rfc-editor.org/rfc/rfc3596#section-2.1>
    AAAA = 28,
    /// Service location <https://www.rfc-editor.org/rfc/rfc2782>
    SRV = 33,
    /// 255 A request for all records (*)
    ANY = 255,
    InvalidType,
}

impl From<&u16> for RecordType {
    fn from(input: &u16) -> Self {
        match input {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            16 => Self::TXT,
            28 => Self::AAAA, // https://www.rfc-editor.org/rfc/rfc3596#section-2.1
            33 => Self::SRV,
            255 => Self::ANY,
            _ => Self::InvalidType,
        }
    }
}

impl From<String> for RecordType {
    fn from(input: String) -> Self {
        let input: RecordType = input.as_str().into();
        input
    }
}

impl From<&str> for RecordType {
    fn from(input: &str) -> Self {
        match input.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::AAAA, // https://www.rfc-editor.org/rfc/rfc3596#section-2.1
            "ANY" => Self::ANY,
            "CNAME" => Self::CNAME,
            "NS" => Self::NS,
            "PTR" => Self::PTR,
            "SOA" => Self::SOA,
            "SRV" => Self::SRV,
            "TXT" => Self::TXT,
            _ => Self::InvalidType,
        }
    }
}

impl From<RecordType> for &'static str {
    fn from(input: RecordType) -> &'static str {
        match input {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::ANY => "ANY",
            RecordType::CNAME => "CNAME",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::TXT => "TXT",
            RecordType::InvalidType => "",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let res: &'static str = self.to_owned().into();
        f.write_fmt(format_args!("{res}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
/// CLASS fields appear in questions and resource records, almost everything
/// real is IN. Unknown values are kept numeric so a round-trip doesn't
/// destroy them. Ref RFC1035 3.2.4.
pub enum RecordClass {
    /// IN - Internet
    Internet,
    /// CS - CSNET class (Obsolete - used only for examples in some obsolete RFCs)
    CsNet,
    /// CH - Chaos
    Chaos,
    /// Hesiod [Dyer 87]
    Hesiod,
    /// Anything else, preserved as the numeric value off the wire
    Other(u16),
}

impl RecordClass {
    /// The 15-bit class value. mDNS flag bits live on the wire word, not here.
    pub fn as_u16(&self) -> u16 {
        match self {
            RecordClass::Internet => 1,
            RecordClass::CsNet => 2,
            RecordClass::Chaos => 3,
            RecordClass::Hesiod => 4,
            RecordClass::Other(value) => *value,
        }
    }
}

impl From<u16> for RecordClass {
    fn from(input: u16) -> Self {
        match input {
            1 => Self::Internet,
            2 => Self::CsNet,
            3 => Self::Chaos,
            4 => Self::Hesiod,
            other => Self::Other(other),
        }
    }
}

impl Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordClass::Internet => f.write_str("IN"),
            RecordClass::CsNet => f.write_str("CS"),
            RecordClass::Chaos => f.write_str("CHAOS"),
            RecordClass::Hesiod => f.write_str("HESIOD"),
            RecordClass::Other(value) => f.write_fmt(format_args!("CLASS{value}")),
        }
    }
}

impl Serialize for RecordClass {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{self}").as_str())
    }
}

#[derive(Debug, PrimitiveEnum_u8, Clone, Copy, Eq, PartialEq)]
pub enum PacketType {
    Query = 0,
    Answer = 1,
}

impl From<bool> for PacketType {
    fn from(input: bool) -> Self {
        match input {
            false => Self::Query,
            true => Self::Answer,
        }
    }
}
