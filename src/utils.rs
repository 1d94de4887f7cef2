use crate::error::GoatHerdError;

/// gets a u16 from the buffer based on the byte start point
pub fn read_u16(buf: &[u8], start_point: usize) -> Result<u16, GoatHerdError> {
    let end_point = start_point + 2;
    if buf.len() < end_point {
        return Err(GoatHerdError::Protocol(format!(
            "wanted 2 bytes at {start_point} but the buffer is {} long",
            buf.len()
        )));
    }
    let mut result_bytes: [u8; 2] = [0, 0];
    result_bytes.copy_from_slice(&buf[start_point..end_point]);
    Ok(u16::from_be_bytes(result_bytes))
}

/// gets a u32 from the buffer based on the byte start point
pub fn read_u32(buf: &[u8], start_point: usize) -> Result<u32, GoatHerdError> {
    let end_point = start_point + 4;
    if buf.len() < end_point {
        return Err(GoatHerdError::Protocol(format!(
            "wanted 4 bytes at {start_point} but the buffer is {} long",
            buf.len()
        )));
    }
    let mut result_bytes: [u8; 4] = [0; 4];
    result_bytes.copy_from_slice(&buf[start_point..end_point]);
    Ok(u32::from_be_bytes(result_bytes))
}

/// Dump a buffer to the debug log, sixteen bytes per row, for when you're
/// staring at packets wondering where it all went wrong.
pub fn hexdump(bytes: &[u8]) {
    for (index, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        log::debug!("{:04x}   {}", index * 16, hex.join(" "));
    }
}
