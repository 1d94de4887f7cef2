//! Whole-message encode/decode - questions, resource records and the
//! [Message] that carries them.

use std::fmt::Display;
use std::net::SocketAddr;

use packed_struct::prelude::*;
use tracing::trace;

use crate::enums::{RecordClass, RecordType};
use crate::error::GoatHerdError;
use crate::name::{name_as_bytes, name_from_bytes, DnsName, NameCompressor};
use crate::rdata::RecordData;
use crate::utils::{read_u16, read_u32};
use crate::{Header, HEADER_BYTES, UDP_BUFFER_SIZE};

/// Top bit of the class word in an mDNS question - "please answer me
/// unicast". Ref [RFC6762 section 5.4](https://www.rfc-editor.org/rfc/rfc6762#section-5.4).
pub const MDNS_UNICAST_RESPONSE: u16 = 0x8000;
/// Top bit of the class word in an mDNS record - "flush your cache of
/// everything else with this name/type". Ref [RFC6762 section 10.2](https://www.rfc-editor.org/rfc/rfc6762#section-10.2).
pub const MDNS_CACHE_FLUSH: u16 = 0x8000;

#[derive(Clone, Debug, PartialEq, Eq)]
/// A DNS Question section, from Ref [RFC1035](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.2) section 4.1.2 "Question section format".
pub struct Question {
    /// The name which is being queried
    pub qname: DnsName,
    /// The Record type that is being requested, eg A, PTR, SRV etc.
    pub qtype: RecordType,
    /// The class, (typically IN for "Internet")
    pub qclass: RecordClass,
    /// mDNS unicast-response flag, carried in the top bit of the class word on the wire
    pub unicast_response: bool,
}

impl Question {
    pub fn new(qname: DnsName, qtype: RecordType) -> Self {
        Question {
            qname,
            qtype,
            qclass: RecordClass::Internet,
            unicast_response: false,
        }
    }

    /// turn a question into bytes on the end of the message buffer
    pub fn append_bytes(
        &self,
        buf: &mut Vec<u8>,
        compressor: Option<&mut NameCompressor>,
    ) -> Result<(), GoatHerdError> {
        if self.qtype == RecordType::InvalidType {
            return Err(GoatHerdError::Protocol(
                "refusing to encode a question with an invalid type".to_string(),
            ));
        }
        name_as_bytes(&self.qname, buf, compressor)?;
        buf.extend((self.qtype as u16).to_be_bytes());
        let mut class = self.qclass.as_u16() & 0x7FFF;
        if self.unicast_response {
            class |= MDNS_UNICAST_RESPONSE;
        }
        buf.extend(class.to_be_bytes());
        Ok(())
    }

    /// hand it the buffer and a position, get back a [Question] and where the next section starts
    pub fn from_bytes(buf: &[u8], pos: usize) -> Result<(Self, usize), GoatHerdError> {
        let (qname, pos) = name_from_bytes(buf, pos)?;
        let qtype_raw = read_u16(buf, pos)?;
        let qtype = RecordType::from(&qtype_raw);
        if qtype == RecordType::InvalidType {
            return Err(GoatHerdError::Protocol(format!(
                "unknown question type {qtype_raw}"
            )));
        }
        let rrclass = read_u16(buf, pos + 2)?;

        Ok((
            Question {
                qname,
                qtype,
                qclass: RecordClass::from(rrclass & 0x7FFF),
                unicast_response: rrclass & MDNS_UNICAST_RESPONSE != 0,
            },
            pos + 4,
        ))
    }
}

impl Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "QNAME={} QTYPE={:?} QCLASS={}",
            self.qname, self.qtype, self.qclass,
        ))
    }
}

/// The answer, authority, and additional sections all share the same
/// format: a variable number of resource records, where the number of
/// records is specified in the corresponding count field in the header.
///
/// Ref [RFC1035 Section 4.1.3](https://www.rfc-editor.org/rfc/rfc1035.html#section-4.1.3)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    /// A domain name to which this resource record pertains.
    pub name: DnsName,
    /// The raw TYPE code off the wire. Stays numeric so unknown types
    /// survive a round-trip; `rdata` holds the decoded payload for the
    /// types we know.
    pub rrtype: u16,
    /// The class of the data in the RDATA field, sans mDNS flag bit.
    pub class: RecordClass,
    /// mDNS cache-flush bit, carried in the top bit of the class word
    pub cache_flush: bool,
    /// How long (in seconds) the record may be cached. Zero means this transaction only.
    pub ttl: u32,
    /// The typed payload
    pub rdata: RecordData,
}

impl ResourceRecord {
    pub fn new(
        name: DnsName,
        rrtype: RecordType,
        class: RecordClass,
        ttl: u32,
        rdata: RecordData,
    ) -> Self {
        ResourceRecord {
            name,
            rrtype: rrtype as u16,
            class,
            cache_flush: false,
            ttl,
            rdata,
        }
    }

    pub fn with_cache_flush(mut self) -> Self {
        self.cache_flush = true;
        self
    }

    pub fn append_bytes(
        &self,
        buf: &mut Vec<u8>,
        mut compressor: Option<&mut NameCompressor>,
    ) -> Result<(), GoatHerdError> {
        name_as_bytes(&self.name, buf, compressor.as_deref_mut())?;
        buf.extend(self.rrtype.to_be_bytes());
        let mut class = self.class.as_u16() & 0x7FFF;
        if self.cache_flush {
            class |= MDNS_CACHE_FLUSH;
        }
        buf.extend(class.to_be_bytes());
        buf.extend(self.ttl.to_be_bytes());

        // RDLENGTH isn't known until the payload is down, backfill it
        let rdlength_at = buf.len();
        buf.extend([0u8, 0u8]);
        self.rdata.append_bytes(buf, compressor)?;
        let rdlength = (buf.len() - rdlength_at - 2) as u16;
        buf[rdlength_at..rdlength_at + 2].copy_from_slice(&rdlength.to_be_bytes());
        Ok(())
    }

    /// Read one record out of the message buffer. The reader lands on
    /// `rdata_start + RDLENGTH` no matter how much of the payload the typed
    /// parser understood, which is what lets unknown record shapes ride
    /// through unharmed.
    pub fn from_bytes(buf: &[u8], pos: usize) -> Result<(Self, usize), GoatHerdError> {
        let (name, pos) = name_from_bytes(buf, pos)?;
        let rrtype = read_u16(buf, pos)?;
        let rrclass = read_u16(buf, pos + 2)?;
        let ttl = read_u32(buf, pos + 4)?;
        let rdlength = read_u16(buf, pos + 8)? as usize;
        let rdata_start = pos + 10;
        if rdata_start + rdlength > buf.len() {
            return Err(GoatHerdError::Protocol(format!(
                "record RDATA wants {rdlength} bytes, buffer has {}",
                buf.len() - rdata_start
            )));
        }

        let rdata = RecordData::from_bytes(rrtype, buf, rdata_start, rdlength)?;

        Ok((
            ResourceRecord {
                name,
                rrtype,
                class: RecordClass::from(rrclass & 0x7FFF),
                cache_flush: rrclass & MDNS_CACHE_FLUSH != 0,
                ttl,
                rdata,
            },
            rdata_start + rdlength,
        ))
    }
}

/// All communications inside of the domain protocol are carried in a single
/// format called a message - RFC1035 wasn't kidding, this is the whole
/// thing for queries, responses, and mDNS announcements alike.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// A standard recursive query with a single question. The ID is left at
    /// zero - the registry assigns a real one at send time.
    pub fn query(qname: DnsName, qtype: RecordType) -> Self {
        let mut header = Header::default();
        header.recursion_desired = true;
        Message {
            header,
            questions: vec![Question::new(qname, qtype)],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        }
    }

    /// Starts a response, copying the ID and question over from a query.
    pub fn response_to(query: &Message) -> Self {
        let header = query.header.clone().as_answer();
        Message {
            header,
            questions: query.questions.clone(),
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        }
    }

    /// Serialize for the wire. The four header counts are taken from the
    /// section lengths, whatever the header said before. `compress` turns on
    /// pointer compression across the whole message - worth it for mDNS
    /// responses where names repeat, skippable for simple client questions.
    pub fn as_bytes(&self, compress: bool) -> Result<Vec<u8>, GoatHerdError> {
        let mut buf: Vec<u8> = Vec::with_capacity(UDP_BUFFER_SIZE);

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;
        buf.extend(header.pack()?);

        let mut compressor = NameCompressor::new();
        for question in &self.questions {
            question.append_bytes(&mut buf, compress.then_some(&mut compressor))?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            record.append_bytes(&mut buf, compress.then_some(&mut compressor))?;
        }
        trace!("encoded message to {} bytes", buf.len());
        Ok(buf)
    }

    /// Parse a whole datagram. Fails closed: one bad record poisons the
    /// message, because there's no way to resync mid-stream in DNS.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, GoatHerdError> {
        if buf.len() < HEADER_BYTES {
            return Err(GoatHerdError::Protocol(format!(
                "message is {} bytes, the header alone is {HEADER_BYTES}",
                buf.len()
            )));
        }
        let mut header_bytes: [u8; HEADER_BYTES] = [0; HEADER_BYTES];
        header_bytes.copy_from_slice(&buf[0..HEADER_BYTES]);
        let header = Header::unpack(&header_bytes)?;
        trace!("parsed header: {header}");

        let mut pos = HEADER_BYTES;
        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (question, next) = Question::from_bytes(buf, pos)?;
            questions.push(question);
            pos = next;
        }

        let mut sections: [Vec<ResourceRecord>; 3] = [vec![], vec![], vec![]];
        for (section, count) in sections
            .iter_mut()
            .zip([header.ancount, header.nscount, header.arcount])
        {
            for _ in 0..count {
                let (record, next) = ResourceRecord::from_bytes(buf, pos)?;
                section.push(record);
                pos = next;
            }
        }
        let [answers, authorities, additionals] = sections;

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

/// A message plus the peer it came from or is headed to.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub addr: SocketAddr,
    pub message: Message,
}
