//! Errors.
//!
//! There are two kinds of errors reported by this crate. Queries sent
//! through a [`Resolver`][crate::resolver::Resolver] fail with a
//! [`ResolveError`] which carries the status of the stub resolver engine.
//! Address lookups go through the system’s resolver and fail with a
//! [`LookupError`] which carries the code reported by `getaddrinfo(3)`.

use std::ffi::CStr;
use std::{error, fmt};

//------------ ResolveError --------------------------------------------------

/// A query through the stub resolver engine has failed.
///
/// The variants and their messages follow the status codes of the c-ares
/// library so that they are familiar to users of other stub resolvers. The
/// name of the status code is available through [`code`][Self::code], the
/// human readable message through the `Display` impl.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResolveError {
    /// The server answered but the answer contained no data.
    NoData,

    /// The server claims the query was malformed.
    FormErr,

    /// The server returned a general failure.
    ServFail,

    /// The domain name does not exist.
    NotFound,

    /// The server does not implement the requested operation.
    NotImp,

    /// The server refused the query.
    Refused,

    /// The query name is not a valid domain name.
    BadName,

    /// The server’s answer could not be parsed.
    BadResp,

    /// None of the servers could be contacted.
    ConnRefused,

    /// All attempts to contact the servers timed out.
    Timeout,

    /// There are no servers to send queries to.
    NoServer,

    /// The resolver is being destroyed.
    Destruction,

    /// The query was cancelled before it completed.
    Cancelled,
}

impl ResolveError {
    /// Returns the name of the status code.
    pub fn code(self) -> &'static str {
        match self {
            ResolveError::NoData => "ENODATA",
            ResolveError::FormErr => "EFORMERR",
            ResolveError::ServFail => "ESERVFAIL",
            ResolveError::NotFound => "ENOTFOUND",
            ResolveError::NotImp => "ENOTIMP",
            ResolveError::Refused => "EREFUSED",
            ResolveError::BadName => "EBADNAME",
            ResolveError::BadResp => "EBADRESP",
            ResolveError::ConnRefused => "ECONNREFUSED",
            ResolveError::Timeout => "ETIMEOUT",
            ResolveError::NoServer => "ENOSERVER",
            ResolveError::Destruction => "EDESTRUCTION",
            ResolveError::Cancelled => "ECANCELLED",
        }
    }

    /// Returns the human readable message for the status.
    pub fn message(self) -> &'static str {
        match self {
            ResolveError::NoData => "DNS server returned answer with no data",
            ResolveError::FormErr => {
                "DNS server claims query was misformatted"
            }
            ResolveError::ServFail => "DNS server returned general failure",
            ResolveError::NotFound => "Domain name not found",
            ResolveError::NotImp => {
                "DNS server does not implement requested operation"
            }
            ResolveError::Refused => "DNS server refused query",
            ResolveError::BadName => "Misformatted domain name",
            ResolveError::BadResp => "Misformatted DNS reply",
            ResolveError::ConnRefused => "Could not contact DNS servers",
            ResolveError::Timeout => "Timeout while contacting DNS servers",
            ResolveError::NoServer => "No DNS servers were configured",
            ResolveError::Destruction => "Channel is being destroyed",
            ResolveError::Cancelled => "DNS query cancelled",
        }
    }
}

//--- Display and Error

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl error::Error for ResolveError {}

//------------ LookupError ---------------------------------------------------

/// An address lookup through the system resolver has failed.
///
/// Most of these errors originate in `getaddrinfo(3)`. In this case,
/// [`raw_code`][Self::raw_code] returns the original `EAI_*` value and the
/// message is the one provided by `gai_strerror(3)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LookupError {
    kind: LookupErrorKind,
    raw: Option<i32>,
    message: String,
}

/// The kind of a lookup error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LookupErrorKind {
    /// Temporary failure in name resolution.
    Again,

    /// Invalid flags in the hints.
    BadFlags,

    /// Non-recoverable failure in name resolution.
    Fail,

    /// The requested address family is not supported.
    Family,

    /// Out of memory.
    Memory,

    /// The host exists but has no usable addresses.
    NoData,

    /// The name is not known.
    NoName,

    /// The service is not supported for the socket type.
    Service,

    /// The socket type is not supported.
    SockType,

    /// A system error occurred, see `errno`.
    System,

    /// An argument buffer overflowed.
    Overflow,

    /// The request was cancelled.
    Cancelled,

    /// The host environment is shutting down.
    Shutdown,

    /// Some other error code.
    Other,
}

impl LookupError {
    /// Creates an error from a code returned by `getaddrinfo(3)`.
    pub fn from_gai(code: i32) -> Self {
        let kind = match code {
            libc::EAI_AGAIN => LookupErrorKind::Again,
            libc::EAI_BADFLAGS => LookupErrorKind::BadFlags,
            libc::EAI_FAIL => LookupErrorKind::Fail,
            libc::EAI_FAMILY => LookupErrorKind::Family,
            libc::EAI_MEMORY => LookupErrorKind::Memory,
            libc::EAI_NONAME => LookupErrorKind::NoName,
            libc::EAI_SERVICE => LookupErrorKind::Service,
            libc::EAI_SOCKTYPE => LookupErrorKind::SockType,
            libc::EAI_SYSTEM => LookupErrorKind::System,
            libc::EAI_OVERFLOW => LookupErrorKind::Overflow,
            _ => LookupErrorKind::Other,
        };
        let message = if kind == LookupErrorKind::System {
            std::io::Error::last_os_error().to_string()
        } else {
            gai_message(code)
        };
        LookupError {
            kind,
            raw: Some(code),
            message,
        }
    }

    /// Creates a new error of the given kind with a default message.
    pub fn new(kind: LookupErrorKind) -> Self {
        let message = match kind {
            LookupErrorKind::Again => "temporary failure",
            LookupErrorKind::BadFlags => "bad ai_flags value",
            LookupErrorKind::Fail => "permanent failure",
            LookupErrorKind::Family => "ai_family not supported",
            LookupErrorKind::Memory => "out of memory",
            LookupErrorKind::NoData => "no address",
            LookupErrorKind::NoName => "unknown node or service",
            LookupErrorKind::Service => {
                "service not available for socket type"
            }
            LookupErrorKind::SockType => "socket type not supported",
            LookupErrorKind::System => "system error",
            LookupErrorKind::Overflow => "argument buffer overflow",
            LookupErrorKind::Cancelled => "operation canceled",
            LookupErrorKind::Shutdown => "environment is shutting down",
            LookupErrorKind::Other => "unknown error",
        };
        LookupError {
            kind,
            raw: None,
            message: message.into(),
        }
    }

    /// The lookup produced no usable addresses.
    pub fn no_data() -> Self {
        Self::new(LookupErrorKind::NoData)
    }

    /// The lookup was cancelled.
    pub fn cancelled() -> Self {
        Self::new(LookupErrorKind::Cancelled)
    }

    /// The lookup was started after teardown had begun.
    pub fn shutdown() -> Self {
        Self::new(LookupErrorKind::Shutdown)
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> LookupErrorKind {
        self.kind
    }

    /// Returns the raw `EAI_*` value if the error came from the system.
    pub fn raw_code(&self) -> Option<i32> {
        self.raw
    }

    /// Returns the name of the error code.
    pub fn code(&self) -> &'static str {
        match self.kind {
            LookupErrorKind::Again => "EAI_AGAIN",
            LookupErrorKind::BadFlags => "EAI_BADFLAGS",
            LookupErrorKind::Fail => "EAI_FAIL",
            LookupErrorKind::Family => "EAI_FAMILY",
            LookupErrorKind::Memory => "EAI_MEMORY",
            LookupErrorKind::NoData => "EAI_NODATA",
            LookupErrorKind::NoName => "EAI_NONAME",
            LookupErrorKind::Service => "EAI_SERVICE",
            LookupErrorKind::SockType => "EAI_SOCKTYPE",
            LookupErrorKind::System => "EAI_SYSTEM",
            LookupErrorKind::Overflow => "EAI_OVERFLOW",
            LookupErrorKind::Cancelled => "ECANCELED",
            LookupErrorKind::Shutdown => "ESHUTDOWN",
            LookupErrorKind::Other => "UNKNOWN",
        }
    }

    /// Returns the human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

//--- Display and Error

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl error::Error for LookupError {}

//------------ Helpers -------------------------------------------------------

fn gai_message(code: i32) -> String {
    // SAFETY: gai_strerror returns a pointer to a static, nul-terminated
    //         string for every input value.
    unsafe {
        let ptr = libc::gai_strerror(code);
        if ptr.is_null() {
            return String::from("unknown error");
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_error_codes() {
        assert_eq!(ResolveError::NotFound.code(), "ENOTFOUND");
        assert_eq!(
            ResolveError::NotFound.to_string(),
            "Domain name not found"
        );
        assert_eq!(ResolveError::Timeout.code(), "ETIMEOUT");
    }

    #[test]
    fn gai_codes() {
        let err = LookupError::from_gai(libc::EAI_NONAME);
        assert_eq!(err.kind(), LookupErrorKind::NoName);
        assert_eq!(err.code(), "EAI_NONAME");
        assert_eq!(err.raw_code(), Some(libc::EAI_NONAME));
        assert!(!err.message().is_empty());
    }

    #[test]
    fn no_data() {
        let err = LookupError::no_data();
        assert_eq!(err.code(), "EAI_NODATA");
        assert_eq!(err.message(), "no address");
        assert_eq!(err.raw_code(), None);
        assert_eq!(err.to_string(), "EAI_NODATA: no address");
    }
}
