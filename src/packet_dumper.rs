//! Optional on-disk capture of raw datagrams, one file per packet, for
//! picking apart later with a hex viewer or scapy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{trace, warn};

/// Which leg of the pipeline a packet was captured on. Each one gets its
/// own subdirectory under `./captures/`.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    QueryOut,
    ReplyIn,
    MdnsIn,
    MdnsOut,
}

impl Direction {
    fn subdir(&self) -> &'static str {
        match self {
            Direction::QueryOut => "query_out",
            Direction::ReplyIn => "reply_in",
            Direction::MdnsIn => "mdns_in",
            Direction::MdnsOut => "mdns_out",
        }
    }
}

// mDNS bursts land several packets in the same second, the counter keeps
// their filenames apart
static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes a datagram to `./captures/<direction>/<stamp>-<seq>.bin`.
/// Capture is best-effort - an unwritable directory costs you the capture,
/// never the traffic.
pub async fn capture_datagram(direction: Direction, payload: &[u8]) {
    let seq = CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = PathBuf::from("./captures").join(direction.subdir());
    if let Err(error) = tokio::fs::create_dir_all(&dir).await {
        trace!("capture directory {dir:?} unavailable: {error:?}");
        return;
    }

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("{stamp}-{seq:06}.bin"));
    match tokio::fs::write(&path, payload).await {
        Ok(()) => trace!("captured {} byte datagram as {path:?}", payload.len()),
        Err(error) => warn!("dropping capture {path:?}: {error:?}"),
    }
}
