//! A DNS and multicast-DNS (mDNS) message codec with an asynchronous
//! query engine on top. Speaks [RFC1035](https://www.rfc-editor.org/rfc/rfc1035)
//! wire format with message compression, correlates unicast queries with
//! their responses over UDP, and can join the mDNS herd on
//! `224.0.0.251`/`ff02::fb` as both querier and responder per
//! [RFC6762](https://www.rfc-editor.org/rfc/rfc6762).

use packed_struct::prelude::*;
use std::fmt::Display;

use crate::enums::*;

/// Client-side query machinery - the pending-query registry and the UDP pipeline.
pub mod client;
/// CLI bits for the `goatherd` binary.
pub mod cli;
/// Configuration handling.
pub mod config;
pub mod enums;
pub mod error;
/// Length-prefixed framing for stream transports. Defined, not used by the UDP core.
pub mod framing;
pub mod message;
/// mDNS group membership and the responder engine.
pub mod multicast;
pub mod name;
pub mod packet_dumper;
pub mod rdata;
/// Typed lookups - the friendly face on top of the client.
pub mod resolver;
#[cfg(test)]
mod tests;
pub mod utils;

/// The size of a DNS message header
pub const HEADER_BYTES: usize = 12;
/// Classical DNS over UDP tops out here; encode buffers start at this size and grow.
pub const UDP_BUFFER_SIZE: usize = 512;
/// mDNS datagrams can use the whole link MTU, so the receive side is roomier.
pub const MDNS_BUFFER_SIZE: usize = 9000;
/// Port for boring unicast DNS
pub const DNS_PORT: u16 = 53;
/// Port for the mDNS herd
pub const MDNS_PORT: u16 = 5353;
/// How long a query gets before the registry gives up on it
pub const DEFAULT_QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// The header of a DNS transmission, either a Query or Reply. Ref [RFC1035](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.1) section 4.1.1.
#[derive(Debug, PackedStruct, PartialEq, Eq, Clone)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12")]
pub struct Header {
    /// The query ID
    #[packed_field(bits = "0..=15", endian = "msb")]
    pub id: u16,
    // Is it a query or response
    #[packed_field(bits = "16", ty = "enum")]
    pub qr: PacketType, // bit 16
    #[packed_field(bits = "17..=20", ty = "enum")]
    pub opcode: OpCode, // 17-20 actually 4 bits
    #[packed_field(bits = "21")]
    pub authoritative: bool, // 21
    #[packed_field(bits = "22")]
    pub truncated: bool, // 22
    // RD - Recursion Desired - this bit may be set in a query and is copied into the response.  If RD is set, it directs the name server to pursue the query recursively. Recursive query support is optional.
    #[packed_field(bits = "23")]
    pub recursion_desired: bool, // 23
    #[packed_field(bits = "24")]
    pub recursion_available: bool, // 24
    /// reserved, must be all 0's
    #[packed_field(bits = "25")]
    pub z: bool, // 25-27
    #[packed_field(bits = "26")]
    pub ad: bool,
    #[packed_field(bits = "27")]
    pub cd: bool,
    #[packed_field(bits = "28..=31", ty = "enum")]
    pub rcode: Rcode, // bits 28-31
    /// an unsigned 16 bit integer specifying the number of entries in the question section.
    #[packed_field(bits = "32..=47", endian = "msb")]
    pub qdcount: u16, // bits 32-47
    /// an unsigned 16 bit integer specifying the number of entries in the answer section.
    #[packed_field(bits = "48..=63", endian = "msb")]
    pub ancount: u16, // 48-63
    /// an unsigned 16 bit integer specifying the number of name server resource records in the authority records section.
    #[packed_field(bits = "64..=79", endian = "msb")]
    pub nscount: u16, // 64-79
    /// an unsigned 16 bit integer specifying the number of resource records in the additional records section.
    #[packed_field(bits = "80..=95", endian = "msb")]
    pub arcount: u16, // 80-95
}

impl Default for Header {
    fn default() -> Self {
        Header {
            id: 0,
            qr: PacketType::Query,
            opcode: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            z: false,
            ad: false,
            cd: false,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }
}

impl Header {
    pub fn as_answer(self) -> Header {
        let mut response = self;
        response.qr = PacketType::Answer;
        response
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "id={} qr={:?} opcode={:?} rcode={:?} qd={} an={} ns={} ar={}",
            self.id,
            self.qr,
            self.opcode,
            self.rcode,
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount
        ))
    }
}
