//! Types for working with errors produced by step7.

use std::fmt;
use std::io::{Error as IOError, ErrorKind};

/// Errors surfaced by sessions and protocol operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// TCP or TPKT read/write failed, or the peer closed the connection.
    Transport(ErrorKind),
    /// Malformed TPKT/COTP/S7 framing, bad protocol id or a truncated field.
    Protocol(String),
    /// The peer answered with an unexpected PDU reference or ROSCTR. Fatal
    /// for the session, the stream can no longer be trusted.
    Desync { expected: u16, received: u16 },
    /// Setup communication was rejected or yielded an unusable PDU size.
    Negotiation(String),
    /// An operation was invoked before the handshake completed or after the
    /// session faulted.
    NotConnected,
    /// An address string could not be parsed or its offsets are out of range.
    Address(String),
    /// A value lies outside the legal range of its data type.
    Range(String),
    /// A buffer was too short for the requested read or write.
    ShortBuffer { needed: usize, available: usize },
    /// The device acknowledged with a non-zero error class.
    S7 { class: u8, code: u8 },
    /// Per-item return code on a ReadVar/WriteVar batch.
    Item(ItemStatus),
    /// The send/receive deadline elapsed.
    Timeout,
    /// No pooled connection became available in time.
    PoolTimeout,
}

impl From<IOError> for Error {
    fn from(e: IOError) -> Self {
        Error::Transport(e.kind())
    }
}

impl Error {
    /// Whether this error faults the session so that the underlying stream
    /// must not be reused.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Protocol(_)
                | Error::Desync { .. }
                | Error::Negotiation(_)
                | Error::Timeout
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Transport error: {e}"),
            Error::Protocol(e) => write!(f, "Protocol error: {e}"),
            Error::Desync { expected, received } => write!(
                f,
                "Protocol desync: expected PDU reference {expected}, received {received}"
            ),
            Error::Negotiation(e) => write!(f, "Negotiation error: {e}"),
            Error::NotConnected => write!(f, "Session is not connected"),
            Error::Address(e) => write!(f, "Address error: {e}"),
            Error::Range(e) => write!(f, "Range error: {e}"),
            Error::ShortBuffer { needed, available } => write!(
                f,
                "Short buffer: needed {needed} bytes, {available} available"
            ),
            Error::S7 { class, code } => write!(
                f,
                "S7 error (class 0x{class:02X}, code 0x{code:02X}): {}",
                s7_error_class_text(*class)
            ),
            Error::Item(status) => write!(f, "{status}"),
            Error::Timeout => write!(f, "Timeout during data exchange"),
            Error::PoolTimeout => write!(f, "Timed out waiting for a pooled connection"),
        }
    }
}

impl std::error::Error for Error {}

fn s7_error_class_text(class: u8) -> &'static str {
    match class {
        0x00 => "No error",
        0x81 => "Application relationship error",
        0x82 => "Object definition error",
        0x83 => "No resources available error",
        0x84 => "Error on service processing",
        0x85 => "Error on supplies",
        0x87 => "Access error",
        _ => "Unknown error class",
    }
}

/// Per-item return code inside a ReadVar/WriteVar acknowledgement.
///
/// These never abort the batch, the affected tag carries the status in its
/// `error` field while its siblings complete normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Hardware fault
    HardwareFault,
    /// Accessing the object is not allowed
    AccessDenied,
    /// Address out of the valid range for the area
    InvalidAddress,
    /// Data type is not supported
    DataTypeNotSupported,
    /// Inconsistencies in the data type occurred
    DataTypeInconsistent,
    /// Requested object does not exist or is not available
    ObjectNotAvailable,
    /// Unknown return code
    Unknown(u8),
}

impl From<u8> for ItemStatus {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Self::HardwareFault,
            0x03 => Self::AccessDenied,
            0x05 => Self::InvalidAddress,
            0x06 => Self::DataTypeNotSupported,
            0x07 => Self::DataTypeInconsistent,
            0x0A => Self::ObjectNotAvailable,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::HardwareFault => "Hardware fault",
            Self::AccessDenied => "Access denied",
            Self::InvalidAddress => "Invalid address",
            Self::DataTypeNotSupported => "Data type not supported",
            Self::DataTypeInconsistent => "Data type inconsistent",
            Self::ObjectNotAvailable => "Object not available",
            Self::Unknown(_) => "Unknown item error",
        };
        write!(f, "{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_status_from_return_code() {
        assert_eq!(ItemStatus::from(0x05), ItemStatus::InvalidAddress);
        assert_eq!(ItemStatus::from(0x0A), ItemStatus::ObjectNotAvailable);
        assert_eq!(ItemStatus::from(0x42), ItemStatus::Unknown(0x42));
        assert_eq!(ItemStatus::from(0x05).to_string(), "Invalid address");
    }

    #[test]
    fn fatal_errors_fault_the_session() {
        assert!(Error::Timeout.is_fatal());
        assert!(Error::Desync {
            expected: 1,
            received: 2
        }
        .is_fatal());
        assert!(!Error::Address("M8.9".to_string()).is_fatal());
        assert!(!Error::Item(ItemStatus::InvalidAddress).is_fatal());
    }
}
