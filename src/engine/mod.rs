//! The stub resolver engine.
//!
//! An engine implements the DNS protocol side of a resolver: it builds
//! queries, owns the sockets used to exchange them with upstream servers,
//! and decides on retries and timeouts. It does not, however, wait for
//! anything. Instead, it tells its user which sockets it currently wants to
//! have monitored for readability or writability and expects to be told
//! when they become ready.
//!
//! All information flows out of the engine synchronously through an
//! [`EngineEvents`] sink passed into each call: socket interest changes
//! via [`socket_state`][EngineEvents::socket_state] and finished queries
//! via [`query_done`][EngineEvents::query_done].
//!
//! The engine shipped with this crate is [`StubEngine`].

pub use self::stub::StubEngine;

use crate::error::ResolveError;
use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::Message;
use domain::rdata::Txt;
use std::os::unix::io::RawFd;
use std::time::Instant;
use std::{fmt, io, ops};

//------------ Sub-modules ---------------------------------------------------

mod server;
pub mod stub;

//------------ Engine --------------------------------------------------------

/// A pull-based stub resolver engine.
///
/// Readiness is reported edge-triggered: once [`process_fd`] has been
/// called for a socket, the engine will only hear about it again after new
/// data has arrived or buffer space has become available. An engine must
/// therefore read from or write to a socket until it would block.
///
/// Dropping the engine must close all its sockets. Queries still pending
/// at that time are abandoned without being reported.
///
/// [`process_fd`]: Engine::process_fd
pub trait Engine {
    /// Starts a new query for `qname` and `rtype`.
    ///
    /// The query is identified by `token` in the eventual
    /// [`query_done`][EngineEvents::query_done] event. That event may
    /// happen before this method returns. If the query cannot be started
    /// at all, an error is returned and there will be no event.
    fn submit(
        &mut self,
        token: QueryToken,
        qname: &str,
        rtype: Rtype,
        events: &mut dyn EngineEvents,
    ) -> Result<(), ResolveError>;

    /// Processes a readiness event for a socket.
    fn process_fd(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
        events: &mut dyn EngineEvents,
    );

    /// Processes a failure to poll a socket.
    ///
    /// The socket will not be polled again until the engine reports new
    /// interest in it. By default, the failure is ignored and the exchange
    /// on the socket is left to time out.
    fn process_fd_error(
        &mut self,
        fd: RawFd,
        err: io::Error,
        events: &mut dyn EngineEvents,
    ) {
        let _ = (fd, err, events);
    }

    /// Returns the time of the next timeout, if any.
    fn next_timeout(&self) -> Option<Instant> {
        None
    }

    /// Processes all timeouts that have expired at `now`.
    fn process_timeouts(
        &mut self,
        now: Instant,
        events: &mut dyn EngineEvents,
    ) {
        let _ = (now, events);
    }
}

//------------ EngineEvents --------------------------------------------------

/// The receiver of events produced by an engine.
pub trait EngineEvents {
    /// The interest in a socket has changed.
    ///
    /// An interest of [`Interest::NONE`] means that the socket is about to
    /// be closed and doesn’t need to be monitored anymore.
    fn socket_state(&mut self, fd: RawFd, interest: Interest);

    /// A query has finished.
    fn query_done(
        &mut self,
        token: QueryToken,
        answer: Result<Answer, ResolveError>,
    );
}

//------------ Interest ------------------------------------------------------

/// The set of readiness events a socket needs to be monitored for.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Interest {
    read: bool,
    write: bool,
}

impl Interest {
    /// Not interested at all.
    pub const NONE: Self = Interest::new(false, false);

    /// Interested in readability.
    pub const READ: Self = Interest::new(true, false);

    /// Interested in writability.
    pub const WRITE: Self = Interest::new(false, true);

    /// Interested in both readability and writability.
    pub const READ_WRITE: Self = Interest::new(true, true);

    /// Creates a new interest value.
    pub const fn new(read: bool, write: bool) -> Self {
        Interest { read, write }
    }

    /// Returns whether readability is of interest.
    pub fn is_readable(self) -> bool {
        self.read
    }

    /// Returns whether writability is of interest.
    pub fn is_writable(self) -> bool {
        self.write
    }

    /// Returns whether there is no interest at all.
    pub fn is_none(self) -> bool {
        !self.read && !self.write
    }

    /// Converts the value into Tokio’s interest, if there is any.
    pub fn to_tokio(self) -> Option<tokio::io::Interest> {
        use tokio::io::Interest as Tokio;

        match (self.read, self.write) {
            (true, true) => Some(Tokio::READABLE.add(Tokio::WRITABLE)),
            (true, false) => Some(Tokio::READABLE),
            (false, true) => Some(Tokio::WRITABLE),
            (false, false) => None,
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => f.write_str("read|write"),
            (true, false) => f.write_str("read"),
            (false, true) => f.write_str("write"),
            (false, false) => f.write_str("none"),
        }
    }
}

//------------ QueryToken ----------------------------------------------------

/// The identifier of a query submitted to an engine.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryToken(u64);

impl QueryToken {
    /// Creates a token from its raw value.
    pub fn from_u64(value: u64) -> Self {
        QueryToken(value)
    }

    /// Returns the raw value of the token.
    pub fn into_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

//------------ Answer --------------------------------------------------------

/// The answer to a query.
///
/// This type is a wrapper around the wire-format DNS [`Message`] received
/// from the upstream server.
#[derive(Clone)]
pub struct Answer {
    message: Message<Bytes>,
}

impl Answer {
    /// Creates an answer from the octets of a DNS message.
    pub fn from_octets(octets: Bytes) -> Result<Self, ResolveError> {
        Message::from_octets(octets)
            .map(Into::into)
            .map_err(|_| ResolveError::BadResp)
    }

    /// Returns whether the answer is truncated.
    pub fn is_truncated(&self) -> bool {
        self.message.header().tc()
    }

    /// Returns the TXT data of the answer as a sequence of chunks.
    ///
    /// Each character string of each TXT record in the answer section
    /// becomes one chunk. The first chunk of every record is marked as
    /// starting a new record. Records of other types are skipped. If there
    /// are no TXT records at all, the answer has no data.
    pub fn txt_chunks(&self) -> Result<Vec<TxtChunk>, ResolveError> {
        let answer = self
            .message
            .answer()
            .map_err(|_| ResolveError::BadResp)?;
        let mut res = Vec::new();
        for record in answer.limit_to::<Txt<_>>() {
            let record = record.map_err(|_| ResolveError::BadResp)?;
            let mut record_start = true;
            for chunk in record.data().iter() {
                res.push(TxtChunk {
                    data: Bytes::copy_from_slice(chunk),
                    record_start,
                });
                record_start = false;
            }
        }
        if res.is_empty() {
            return Err(ResolveError::NoData);
        }
        Ok(res)
    }

    /// Converts the answer into the underlying message.
    pub fn into_message(self) -> Message<Bytes> {
        self.message
    }
}

impl From<Message<Bytes>> for Answer {
    fn from(message: Message<Bytes>) -> Self {
        Answer { message }
    }
}

impl ops::Deref for Answer {
    type Target = Message<Bytes>;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl AsRef<Message<Bytes>> for Answer {
    fn as_ref(&self) -> &Message<Bytes> {
        &self.message
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Answer")
            .field("id", &self.message.header().id())
            .field("len", &self.message.as_slice().len())
            .finish()
    }
}

//------------ TxtChunk ------------------------------------------------------

/// One character string of a TXT record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxtChunk {
    /// The content of the character string.
    pub data: Bytes,

    /// Does this chunk start a new record?
    pub record_start: bool,
}
