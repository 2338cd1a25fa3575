use std::io;
use std::net;

pub type NetResult<T> = Result<T, NetError>;

/// Wire and daemon plumbing errors. `Wait` means "no full record available
/// yet, try again"; everything else is fatal for the link that produced it.
#[derive(Debug, Eq, PartialEq)]
pub enum NetError {
    Wait,
    Fatal(FatalKind),
}

#[derive(Debug, Eq, PartialEq)]
pub enum FatalKind {
    BadDelimiter,
    PayloadTooLarge,
    TruncatedRecord,
    BadSegType,
    BadPktType,
    RouteUnknown,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetError::Wait,
            kind => NetError::Fatal(FatalKind::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetError::Fatal(FatalKind::AddrParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetError::Wait) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_is_wait() {
        let err: NetError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetError::Wait);
    }

    #[test]
    fn test_eof_is_fatal() {
        let err: NetError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err, NetError::Fatal(FatalKind::Io(io::ErrorKind::UnexpectedEof)));
    }

    #[test]
    fn test_has_failed() {
        let ok: NetResult<()> = Ok(());
        let wait: NetResult<()> = Err(NetError::Wait);
        let fatal: NetResult<()> = Err(NetError::Fatal(FatalKind::BadDelimiter));

        assert!(!ok.has_failed());
        assert!(!wait.has_failed());
        assert!(fatal.has_failed());
    }
}
