use std::str::Utf8Error;

use packed_struct::PackingError;

/// When things go awry
#[derive(Debug)]
pub enum GoatHerdError {
    /// A malformed header, truncated section, bad label length or pointer - anything that means we can't trust the rest of the packet.
    Protocol(String),
    /// Got a response whose ID doesn't match anything we have in flight.
    UnknownQuery(u16),
    /// The query sat in the pending table past its deadline.
    Timeout,
    /// Somebody called `cancel_all` while this query was in flight.
    Cancelled,
    /// Precondition failures - wrong-length address bytes, that kind of thing.
    Unsupported(String),
    /// Can't build a client without somewhere to send queries.
    MissingNameservers,
    /// Setup-time only, the config file didn't parse.
    UnableToParseConfig(String),
    /// An SOA payload that was too short or otherwise mangled.
    InvalidSOARecord(String),
    BytePackingError(String),
    InvalidName(String),
    IoError(std::io::Error),
    /// Something failed in the start up of the platform
    StartupError(String),
    /// Failed to send something across a tokio channel
    SendError(String),
    Utf8Error(Utf8Error),
    /// The client's socket task went away underneath us.
    ChannelClosed,
}

impl From<std::io::Error> for GoatHerdError {
    fn from(error: std::io::Error) -> Self {
        GoatHerdError::IoError(error)
    }
}

impl From<PackingError> for GoatHerdError {
    fn from(error: PackingError) -> Self {
        GoatHerdError::BytePackingError(error.to_string())
    }
}

impl From<Utf8Error> for GoatHerdError {
    fn from(error: Utf8Error) -> Self {
        GoatHerdError::Utf8Error(error)
    }
}

impl std::fmt::Display for GoatHerdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoatHerdError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            GoatHerdError::UnknownQuery(id) => write!(f, "no pending query with id {id}"),
            GoatHerdError::Timeout => write!(f, "query timed out"),
            GoatHerdError::Cancelled => write!(f, "query was cancelled"),
            GoatHerdError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            GoatHerdError::MissingNameservers => write!(f, "no nameservers configured"),
            GoatHerdError::UnableToParseConfig(msg) => {
                write!(f, "unable to parse configuration: {msg}")
            }
            GoatHerdError::InvalidSOARecord(msg) => write!(f, "invalid SOA record: {msg}"),
            GoatHerdError::BytePackingError(msg) => write!(f, "byte packing error: {msg}"),
            GoatHerdError::InvalidName(msg) => write!(f, "invalid name: {msg}"),
            GoatHerdError::IoError(err) => write!(f, "io error: {err}"),
            GoatHerdError::StartupError(msg) => write!(f, "startup error: {msg}"),
            GoatHerdError::SendError(msg) => write!(f, "channel send error: {msg}"),
            GoatHerdError::Utf8Error(err) => write!(f, "utf8 error: {err}"),
            GoatHerdError::ChannelClosed => write!(f, "client channel is closed"),
        }
    }
}

impl std::error::Error for GoatHerdError {}

impl From<GoatHerdError> for std::io::Error {
    fn from(error: GoatHerdError) -> Self {
        match error {
            GoatHerdError::IoError(err) => err,
            GoatHerdError::Timeout => {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "query timed out")
            }
            GoatHerdError::StartupError(err) => std::io::Error::other(err),
            GoatHerdError::SendError(err) => std::io::Error::other(err),
            _ => std::io::Error::other(format!("{:?}", error)),
        }
    }
}
