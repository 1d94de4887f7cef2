//! DNS over stream transports prefixes each message with a two-byte
//! big-endian length. Ref [RFC1035 section 4.2.2](https://www.rfc-editor.org/rfc/rfc1035#section-4.2.2)
//! and [RFC7766 section 8](https://www.rfc-editor.org/rfc/rfc7766#section-8).
//! The UDP client core doesn't use this - it's here for anything that wants
//! to carry messages over TCP or a pipe.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::GoatHerdError;
use crate::message::Message;

/// Encode a message and bolt the length prefix on the front.
pub fn frame_message(message: &Message, compress: bool) -> Result<Vec<u8>, GoatHerdError> {
    let body = message.as_bytes(compress)?;
    if body.len() > u16::MAX as usize {
        return Err(GoatHerdError::Protocol(format!(
            "message is {} bytes, framing caps out at {}",
            body.len(),
            u16::MAX
        )));
    }
    let mut framed = Vec::with_capacity(body.len() + 2);
    framed.extend((body.len() as u16).to_be_bytes());
    framed.extend(body);
    Ok(framed)
}

/// Pull one length-prefixed message off a buffer. Returns the message and
/// how many bytes it consumed, or `None` when the buffer doesn't hold a
/// whole frame yet.
pub fn deframe_message(buf: &[u8]) -> Result<Option<(Message, usize)>, GoatHerdError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let msg_length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < msg_length + 2 {
        return Ok(None);
    }
    let message = Message::from_bytes(&buf[2..msg_length + 2])?;
    Ok(Some((message, msg_length + 2)))
}

/// Write one framed message to a stream.
pub async fn write_framed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
    compress: bool,
) -> Result<(), GoatHerdError> {
    let framed = frame_message(message, compress)?;
    writer.write_all(&framed).await?;
    Ok(())
}

/// Read one framed message from a stream - the length, then exactly that
/// many bytes.
pub async fn read_framed<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, GoatHerdError> {
    let msg_length: usize = reader.read_u16().await?.into();
    let mut buf: Vec<u8> = vec![0; msg_length];
    reader.read_exact(&mut buf).await?;
    Message::from_bytes(&buf)
}
