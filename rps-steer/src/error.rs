use std::collections::TryReserveError;
use std::fmt;

use crate::BoxError;
use crate::handler::ProtocolId;

/// Error type for control-plane operations.
///
/// The hot path (`dispatch`, `lookup`, `decide`) never fails; "no decision"
/// is reported as `None`, not as an error.
#[derive(Debug)]
pub enum Error {
    /// Handler protocol is outside `0..MAX_PROTOCOLS`.
    InvalidProtocol(ProtocolId),
    /// The handler's `on_register` hook failed. The handler was not linked.
    HandlerInit {
        handler: String,
        source: BoxError,
    },
    /// Building a replacement snapshot failed to allocate. Nothing was published.
    AllocationFailure(TryReserveError),
    /// The handler is already linked into a protocol list.
    AlreadyRegistered { handler: String, protocol: ProtocolId },
    /// The handler is not linked into its protocol list.
    NotRegistered { handler: String, protocol: ProtocolId },
    /// A configuration value was rejected by the builder.
    InvalidConfig(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidProtocol(p) => write!(f, "protocol {p} is out of range"),
            Error::HandlerInit { handler, source } => {
                write!(f, "handler {handler} failed to initialize: {source}")
            }
            Error::AllocationFailure(e) => write!(f, "allocation failed: {e}"),
            Error::AlreadyRegistered { handler, protocol } => {
                write!(f, "handler {handler} already registered for protocol {protocol}")
            }
            Error::NotRegistered { handler, protocol } => {
                write!(f, "handler {handler} is not registered for protocol {protocol}")
            }
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::HandlerInit { source, .. } => Some(source.as_ref()),
            Error::AllocationFailure(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Error::AllocationFailure(e)
    }
}
