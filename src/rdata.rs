//! RDATA field types - the typed payloads that live inside resource records.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::enums::RecordType;
use crate::error::GoatHerdError;
use crate::name::{name_as_bytes, name_from_bytes, DnsName, NameCompressor};
use crate::utils::{read_u16, read_u32};

/// `<character-string>` is a single length octet followed by that number of
/// characters, so up to 256 bytes in length including the length octet.
/// Ref [RFC1035 section 3.3](https://www.rfc-editor.org/rfc/rfc1035#section-3.3).
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DnsCharString {
    pub data: Vec<u8>,
}

impl From<&str> for DnsCharString {
    fn from(input: &str) -> Self {
        DnsCharString { data: input.into() }
    }
}

impl std::fmt::Display for DnsCharString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.data))
    }
}

/// The payload of a resource record. Known types get a typed reader, anything
/// else lands in `Other` as an owned copy of the raw bytes - the numeric type
/// code stays on the record wrapper, not in here.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RecordData {
    /// A single host address
    A { address: Ipv4Addr },
    /// An IPv6 host address <https://www.rfc-editor.org/rfc/rfc3596#section-2.2>
    AAAA { address: Ipv6Addr },
    /// Text strings. `txtdata` is the concatenation of the character-strings
    /// in the payload; when it looks like exactly one `key=value` the split
    /// is pre-chewed into `key`/`value`, otherwise both stay empty.
    TXT {
        txtdata: DnsCharString,
        key: String,
        value: String,
    },
    /// Service location <https://www.rfc-editor.org/rfc/rfc2782>
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DnsName,
    },
    /// A domain name pointer
    PTR { ptrdname: DnsName },
    /// Everything else, kept verbatim
    Other { rdata: Vec<u8> },
}

impl PartialEq<RecordType> for RecordData {
    fn eq(&self, other: &RecordType) -> bool {
        match self {
            RecordData::A { .. } => other == &RecordType::A,
            RecordData::AAAA { .. } => other == &RecordType::AAAA,
            RecordData::TXT { .. } => other == &RecordType::TXT,
            RecordData::SRV { .. } => other == &RecordType::SRV,
            RecordData::PTR { .. } => other == &RecordType::PTR,
            RecordData::Other { .. } => other == &RecordType::InvalidType,
        }
    }
}

impl RecordData {
    /// Parses the payload of a record out of the message buffer.
    ///
    /// `buf` is the whole datagram, not just the RDATA slice, because PTR and
    /// SRV targets are allowed to point back into earlier parts of the
    /// message. Everything returned owns its bytes - nothing borrows from
    /// `buf` once this returns.
    pub fn from_bytes(
        rrtype: u16,
        buf: &[u8],
        rdata_start: usize,
        rdlength: usize,
    ) -> Result<Self, GoatHerdError> {
        let end = rdata_start + rdlength;
        if end > buf.len() {
            return Err(GoatHerdError::Protocol(format!(
                "RDLENGTH {rdlength} runs past the end of a {} byte buffer",
                buf.len()
            )));
        }

        match RecordType::from(&rrtype) {
            RecordType::A => {
                if rdlength != 4 {
                    return Err(GoatHerdError::Unsupported(format!(
                        "A record RDATA must be exactly 4 bytes, got {rdlength}"
                    )));
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&buf[rdata_start..end]);
                Ok(RecordData::A {
                    address: Ipv4Addr::from(octets),
                })
            }
            RecordType::AAAA => {
                if rdlength != 16 {
                    return Err(GoatHerdError::Unsupported(format!(
                        "AAAA record RDATA must be exactly 16 bytes, got {rdlength}"
                    )));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[rdata_start..end]);
                Ok(RecordData::AAAA {
                    address: Ipv6Addr::from(octets),
                })
            }
            RecordType::TXT => {
                // RDATA is one-or-more <character-string>s, we keep the concatenation
                let mut text: Vec<u8> = vec![];
                let mut pos = rdata_start;
                while pos < end {
                    let len = buf[pos] as usize;
                    pos += 1;
                    if pos + len > end {
                        return Err(GoatHerdError::Protocol(
                            "TXT character-string runs past RDLENGTH".to_string(),
                        ));
                    }
                    text.extend_from_slice(&buf[pos..pos + len]);
                    pos += len;
                }

                let (key, value) = split_txt_pair(&text);
                Ok(RecordData::TXT {
                    txtdata: DnsCharString { data: text },
                    key,
                    value,
                })
            }
            RecordType::SRV => {
                if rdlength < 7 {
                    return Err(GoatHerdError::Protocol(format!(
                        "SRV record RDATA too short: {rdlength} bytes"
                    )));
                }
                let priority = read_u16(buf, rdata_start)?;
                let weight = read_u16(buf, rdata_start + 2)?;
                let port = read_u16(buf, rdata_start + 4)?;
                let (target, next) = name_from_bytes(buf, rdata_start + 6)?;
                if next > end {
                    return Err(GoatHerdError::Protocol(
                        "SRV target runs past RDLENGTH".to_string(),
                    ));
                }
                Ok(RecordData::SRV {
                    priority,
                    weight,
                    port,
                    target,
                })
            }
            RecordType::PTR => {
                let (ptrdname, next) = name_from_bytes(buf, rdata_start)?;
                if next > end {
                    return Err(GoatHerdError::Protocol(
                        "PTR target runs past RDLENGTH".to_string(),
                    ));
                }
                Ok(RecordData::PTR { ptrdname })
            }
            // NS/CNAME/SOA and anything we've never heard of ride along raw,
            // SOA gets its own on-demand parser below.
            _ => Ok(RecordData::Other {
                rdata: buf[rdata_start..end].to_vec(),
            }),
        }
    }

    /// Appends the payload bytes (not the RDLENGTH) to the message buffer.
    pub fn append_bytes(
        &self,
        buf: &mut Vec<u8>,
        compressor: Option<&mut NameCompressor>,
    ) -> Result<(), GoatHerdError> {
        match self {
            RecordData::A { address } => buf.extend_from_slice(&address.octets()),
            RecordData::AAAA { address } => buf.extend_from_slice(&address.octets()),
            RecordData::TXT { txtdata, .. } => {
                // chunk into character-strings, 255 bytes of payload apiece
                if txtdata.data.is_empty() {
                    buf.push(0);
                }
                for chunk in txtdata.data.chunks(255) {
                    buf.push(chunk.len() as u8);
                    buf.extend_from_slice(chunk);
                }
            }
            RecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                // RFC2782 says the target name is never compressed
                name_as_bytes(target, buf, None)?;
            }
            RecordData::PTR { ptrdname } => {
                name_as_bytes(ptrdname, buf, compressor)?;
            }
            RecordData::Other { rdata } => buf.extend_from_slice(rdata),
        }
        Ok(())
    }
}

/// The `key=value` convention from TXT records - exactly one `=` means a
/// usable pair, anything else and the caller just gets the raw text.
fn split_txt_pair(text: &[u8]) -> (String, String) {
    if text.iter().filter(|b| **b == b'=').count() != 1 {
        return (String::new(), String::new());
    }
    match std::str::from_utf8(text) {
        Ok(value) => match value.split_once('=') {
            Some((key, val)) => (key.to_string(), val.to_string()),
            None => (String::new(), String::new()),
        },
        Err(_) => (String::new(), String::new()),
    }
}

/// Start-of-authority data, parsed on demand out of a [RecordData::Other]
/// payload. Ref [RFC1035 section 3.3.13](https://www.rfc-editor.org/rfc/rfc1035#section-3.3.13).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SoaRecord {
    /// The name server that was the original or primary source of data for this zone.
    pub mname: DnsName,
    /// The mailbox of the person responsible for this zone.
    pub rname: DnsName,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SoaRecord {
    /// Parse from a raw RDATA slice. The names have to be stored
    /// uncompressed here - the slice is an owned copy, so there's nothing
    /// for a pointer to point back into.
    pub fn parse(rdata: &[u8]) -> Result<Self, GoatHerdError> {
        let (mname, pos) = name_from_bytes(rdata, 0)
            .map_err(|e| GoatHerdError::InvalidSOARecord(format!("bad MNAME: {e}")))?;
        let (rname, pos) = name_from_bytes(rdata, pos)
            .map_err(|e| GoatHerdError::InvalidSOARecord(format!("bad RNAME: {e}")))?;

        if rdata.len() < pos + 20 {
            return Err(GoatHerdError::InvalidSOARecord(format!(
                "wanted 20 bytes of counters at {pos}, RDATA is {} bytes",
                rdata.len()
            )));
        }

        Ok(SoaRecord {
            mname,
            rname,
            serial: read_u32(rdata, pos)
                .map_err(|e| GoatHerdError::InvalidSOARecord(e.to_string()))?,
            refresh: read_u32(rdata, pos + 4)
                .map_err(|e| GoatHerdError::InvalidSOARecord(e.to_string()))?,
            retry: read_u32(rdata, pos + 8)
                .map_err(|e| GoatHerdError::InvalidSOARecord(e.to_string()))?,
            expire: read_u32(rdata, pos + 12)
                .map_err(|e| GoatHerdError::InvalidSOARecord(e.to_string()))?,
            minimum: read_u32(rdata, pos + 16)
                .map_err(|e| GoatHerdError::InvalidSOARecord(e.to_string()))?,
        })
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, GoatHerdError> {
        let mut retval: Vec<u8> = vec![];
        name_as_bytes(&self.mname, &mut retval, None)?;
        name_as_bytes(&self.rname, &mut retval, None)?;
        retval.extend(self.serial.to_be_bytes());
        retval.extend(self.refresh.to_be_bytes());
        retval.extend(self.retry.to_be_bytes());
        retval.extend(self.expire.to_be_bytes());
        retval.extend(self.minimum.to_be_bytes());
        Ok(retval)
    }
}

#[cfg(test)]
mod tests {
    use super::{DnsCharString, RecordData, SoaRecord};
    use crate::enums::RecordType;
    use crate::name::DnsName;

    #[test]
    fn test_record_data_matches_record_type() {
        let record = RecordData::A {
            address: "192.0.2.1".parse().expect("address should parse"),
        };
        assert_eq!(record, RecordType::A);
        assert_ne!(record, RecordType::AAAA);
    }

    #[test]
    fn test_dnscharstring() {
        let test: DnsCharString = "hello world".into();
        assert_eq!(test.data.len(), 11);
        assert_eq!(test.to_string(), "hello world");
    }

    #[test]
    fn test_txt_key_value_split() {
        let buf = [7u8, b'k', b'e', b'y', b'=', b'v', b'a', b'l'];
        let parsed = RecordData::from_bytes(16, &buf, 0, buf.len()).expect("TXT should parse");
        match parsed {
            RecordData::TXT { txtdata, key, value } => {
                assert_eq!(txtdata.data, b"key=val");
                assert_eq!(key, "key");
                assert_eq!(value, "val");
            }
            _ => panic!("wanted a TXT record, got {parsed:?}"),
        }
    }

    #[test]
    fn test_txt_without_pair() {
        let buf = [5u8, b'h', b'e', b'l', b'l', b'o'];
        let parsed = RecordData::from_bytes(16, &buf, 0, buf.len()).expect("TXT should parse");
        match parsed {
            RecordData::TXT { txtdata, key, value } => {
                assert_eq!(txtdata.data, b"hello");
                assert!(key.is_empty());
                assert!(value.is_empty());
            }
            _ => panic!("wanted a TXT record, got {parsed:?}"),
        }
    }

    #[test]
    fn test_txt_multiple_character_strings() {
        // two character-strings inside one RDATA, per RFC1035 3.3.14
        let buf = [3u8, b'f', b'o', b'o', 3u8, b'b', b'a', b'r'];
        let parsed = RecordData::from_bytes(16, &buf, 0, buf.len()).expect("TXT should parse");
        match parsed {
            RecordData::TXT { txtdata, .. } => assert_eq!(txtdata.data, b"foobar"),
            _ => panic!("wanted a TXT record, got {parsed:?}"),
        }
    }

    #[test]
    fn test_soa_roundtrip() {
        let soa = SoaRecord {
            mname: DnsName::try_from("ns1.example.goat").expect("name should parse"),
            rname: DnsName::try_from("hostmaster.example.goat").expect("name should parse"),
            serial: 2023121601,
            refresh: 7200,
            retry: 3600,
            expire: 1209600,
            minimum: 300,
        };
        let bytes = soa.as_bytes().expect("SOA should serialize");
        let parsed = SoaRecord::parse(&bytes).expect("SOA should parse");
        assert_eq!(soa, parsed);
    }

    #[test]
    fn test_soa_too_short() {
        // a lonely root name and nothing else
        assert!(SoaRecord::parse(&[0, 0]).is_err());
        assert!(SoaRecord::parse(&[]).is_err());
    }
}
