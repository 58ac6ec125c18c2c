use std::fmt;

/// Error kinds surfaced by the transport core.
///
/// Each variant corresponds to a row in the transport core's error
/// table: callers match on the kind to apply the right policy (fatal,
/// log-and-continue, drop-and-notify, or silent).
#[derive(Debug)]
pub enum BusError {
    /// Connect, auth, or consumer-group declaration failed against the
    /// broker. Fatal to the affected connection.
    BrokerUnreachable(String),

    /// The broker returned an error reply mid-session. The connection
    /// remains usable; the failed operation does not.
    BrokerReplyError(String),

    /// A recipient address could not be parsed into a domain.
    BadAddress(String),

    /// Received JSON did not decode into a valid envelope.
    MalformedEnvelope(String),

    /// An operation was invoked outside the state it requires.
    NotReady(String),

    /// The YAML configuration is missing a required key or contains a
    /// dangling cross-reference.
    ConfigInvalid(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BusError::BrokerUnreachable(s) => write!(f, "broker unreachable: {s}"),
            BusError::BrokerReplyError(s) => write!(f, "broker reply error: {s}"),
            BusError::BadAddress(s) => write!(f, "bad address: {s}"),
            BusError::MalformedEnvelope(s) => write!(f, "malformed envelope: {s}"),
            BusError::NotReady(s) => write!(f, "not ready: {s}"),
            BusError::ConfigInvalid(s) => write!(f, "invalid configuration: {s}"),
        }
    }
}

impl std::error::Error for BusError {}

pub type BusResult<T> = Result<T, BusError>;
