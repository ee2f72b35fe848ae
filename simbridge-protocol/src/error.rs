use std::{
    error::Error,
    fmt::Display,
    io::{self},
};

/// Errors that may occur when reading bridge traffic from a stream.
///
/// Only the peer that consumes responses can see these. Command bytes cannot be
/// malformed, unknown ones are ignored by the target.
#[derive(Debug)]
pub enum ReadError {
    IoError(io::Error),
    /// A response byte outside `'0'..='3'`.
    InvalidResponse(u8),
    /// The peer closed the connection while a response was outstanding.
    Disconnected,
}

impl From<io::Error> for ReadError {
    fn from(value: io::Error) -> Self {
        if value.kind() == io::ErrorKind::UnexpectedEof {
            ReadError::Disconnected
        } else {
            ReadError::IoError(value)
        }
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IoError(error) => write!(f, "{}", error),
            ReadError::InvalidResponse(byte) => {
                write!(f, "Received invalid response byte 0x{:02x}", byte)
            }
            ReadError::Disconnected => write!(f, "Peer closed the connection"),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadError::IoError(error) => Some(error),
            _ => None,
        }
    }
}

#[test]
fn eof_maps_to_disconnected() {
    let err = ReadError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
    assert!(matches!(err, ReadError::Disconnected));
    let err = ReadError::from(io::Error::from(io::ErrorKind::BrokenPipe));
    assert!(matches!(err, ReadError::IoError(_)));
}
