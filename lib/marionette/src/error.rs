use std::io;
use std::net;

pub type NetResult<T> = Result<T, NetError>;

/// Transport-level error split. `Wait` means the operation would block and
/// should be retried on a later tick; `Fatal` means the connection is beyond
/// saving.
#[derive(Debug, Eq, PartialEq)]
pub enum NetError {
    Wait,
    Fatal(ErrorKind),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Request head or body exceeded the accumulator limit.
    TooLarge,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetError::Wait,
            io::ErrorKind::Interrupted => NetError::Wait,
            kind => NetError::Fatal(ErrorKind::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetError::Fatal(ErrorKind::AddrParse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wouldblock_folds_to_wait() {
        let err: NetError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetError::Wait);
    }

    #[test]
    fn test_interrupted_folds_to_wait() {
        let err: NetError = io::Error::from(io::ErrorKind::Interrupted).into();
        assert_eq!(err, NetError::Wait);
    }

    #[test]
    fn test_other_io_is_fatal() {
        let err: NetError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert_eq!(err, NetError::Fatal(ErrorKind::Io(io::ErrorKind::BrokenPipe)));
    }
}
