//! Domain name handling - the length-prefixed label encoding from
//! [RFC1035](https://www.rfc-editor.org/rfc/rfc1035#section-3.1) plus the
//! message-compression pointers from section 4.1.4.

use std::collections::HashMap;
use std::fmt::Display;

use crate::error::GoatHerdError;

/// Longest a name can be once encoded, including the length octets and terminator.
pub const MAX_NAME_BYTES: usize = 255;
/// Longest a single label can be - the two high bits of the length octet are the pointer tag.
pub const MAX_LABEL_BYTES: usize = 63;
/// Give up chasing compression pointers after this many hops.
pub const MAX_POINTER_HOPS: usize = 128;

/// An owned domain name, one entry per label. The root terminator isn't
/// stored, an empty `labels` is the root name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DnsName {
    pub labels: Vec<Vec<u8>>,
}

impl DnsName {
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// How many bytes this takes on the wire, uncompressed.
    pub fn encoded_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Case-folded key for a label suffix, used by the compression map.
    fn suffix_key(labels: &[Vec<u8>]) -> String {
        labels
            .iter()
            .map(|l| String::from_utf8_lossy(l).to_ascii_lowercase())
            .collect::<Vec<String>>()
            .join(".")
    }

    fn check(&self) -> Result<(), GoatHerdError> {
        for label in &self.labels {
            if label.is_empty() {
                return Err(GoatHerdError::InvalidName("empty label".to_string()));
            }
            if label.len() > MAX_LABEL_BYTES {
                return Err(GoatHerdError::InvalidName(format!(
                    "label is {} bytes, needs to be <= {MAX_LABEL_BYTES}",
                    label.len()
                )));
            }
        }
        if self.encoded_len() > MAX_NAME_BYTES {
            return Err(GoatHerdError::InvalidName(format!(
                "name would encode to {} bytes, needs to be <= {MAX_NAME_BYTES}",
                self.encoded_len()
            )));
        }
        Ok(())
    }
}

impl TryFrom<&str> for DnsName {
    type Error = GoatHerdError;

    fn try_from(input: &str) -> Result<Self, Self::Error> {
        if input.is_empty() {
            return Err(GoatHerdError::InvalidName("empty domain name".to_string()));
        }

        // "." is just the root
        let labels: Vec<Vec<u8>> = input
            .split('.')
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| chunk.as_bytes().to_vec())
            .collect();

        let name = DnsName { labels };
        name.check()?;
        Ok(name)
    }
}

impl TryFrom<String> for DnsName {
    type Error = GoatHerdError;

    fn try_from(input: String) -> Result<Self, Self::Error> {
        DnsName::try_from(input.as_str())
    }
}

impl Display for DnsName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let rendered: Vec<String> = self
            .labels
            .iter()
            .map(|l| String::from_utf8_lossy(l).to_string())
            .collect();
        f.write_str(&rendered.join("."))
    }
}

/// Offsets of name suffixes already written into the message being encoded.
/// Hand the same one to every name write for a given message and shared
/// suffixes collapse into two-byte pointers.
#[derive(Debug, Default)]
pub struct NameCompressor {
    offsets: HashMap<String, u16>,
}

impl NameCompressor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Appends `name` to `buf` as labels, each one length-prefixed, with a zero
/// terminator. When a compressor is handed in, any suffix already seen in
/// this message is emitted as a 14-bit pointer instead and encoding stops
/// there. `buf` must be the whole message so far - pointer offsets are
/// measured from the start of the message.
pub fn name_as_bytes(
    name: &DnsName,
    buf: &mut Vec<u8>,
    mut compressor: Option<&mut NameCompressor>,
) -> Result<(), GoatHerdError> {
    name.check()?;

    for index in 0..name.labels.len() {
        if let Some(compressor) = compressor.as_deref_mut() {
            let key = DnsName::suffix_key(&name.labels[index..]);
            if let Some(&offset) = compressor.offsets.get(&key) {
                buf.push(0xC0 | (offset >> 8) as u8);
                buf.push((offset & 0xFF) as u8);
                return Ok(());
            }
            // pointers only reach 14 bits back, further suffixes stay verbatim
            if buf.len() <= 0x3FFF {
                compressor.offsets.insert(key, buf.len() as u16);
            }
        }
        let label = &name.labels[index];
        buf.push(label.len() as u8);
        buf.extend_from_slice(label);
    }
    buf.push(0);
    Ok(())
}

/// Reads a name starting at `start`, following compression pointers.
///
/// Returns the name and the position of the first byte after the name's
/// encoding - after the terminator, or after the first pointer if the name
/// was compressed. Pointers have to aim strictly backwards, and both the
/// hop count and the accumulated name length are bounded, so a crafted
/// packet can't walk us in circles.
pub fn name_from_bytes(buf: &[u8], start: usize) -> Result<(DnsName, usize), GoatHerdError> {
    let mut labels: Vec<Vec<u8>> = vec![];
    let mut pos = start;
    let mut resume_at: Option<usize> = None;
    let mut hops = 0usize;
    let mut encoded = 1usize; // the terminator

    loop {
        let len = *buf
            .get(pos)
            .ok_or_else(|| GoatHerdError::Protocol("name runs past end of buffer".to_string()))?;

        match len {
            0 => {
                pos += 1;
                break;
            }
            len if len & 0xC0 == 0xC0 => {
                let low = *buf.get(pos + 1).ok_or_else(|| {
                    GoatHerdError::Protocol("truncated compression pointer".to_string())
                })?;
                let offset = (((len & 0x3F) as usize) << 8) | low as usize;
                if offset >= pos {
                    return Err(GoatHerdError::Protocol(format!(
                        "compression pointer at {pos} points forwards to {offset}"
                    )));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(GoatHerdError::Protocol(format!(
                        "more than {MAX_POINTER_HOPS} compression pointer hops"
                    )));
                }
                if resume_at.is_none() {
                    resume_at = Some(pos + 2);
                }
                pos = offset;
            }
            len if len & 0xC0 != 0 => {
                // 0x40 and 0x80 label types were reserved and never assigned
                return Err(GoatHerdError::Protocol(format!(
                    "unsupported label type 0x{:02x}",
                    len & 0xC0
                )));
            }
            len => {
                let len = len as usize;
                let end = pos + 1 + len;
                if end > buf.len() {
                    return Err(GoatHerdError::Protocol(
                        "label runs past end of buffer".to_string(),
                    ));
                }
                encoded += len + 1;
                if encoded > MAX_NAME_BYTES {
                    return Err(GoatHerdError::Protocol(format!(
                        "name expands past {MAX_NAME_BYTES} bytes"
                    )));
                }
                labels.push(buf[pos + 1..end].to_vec());
                pos = end;
            }
        }
    }

    Ok((DnsName { labels }, resume_at.unwrap_or(pos)))
}
