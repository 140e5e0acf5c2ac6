//! A non-blocking stub resolver engine.
//!
//! The [`StubEngine`] sends queries to the upstream servers of a
//! [`ResolvConf`] over UDP, falling back to TCP for truncated answers. It
//! never blocks and never waits: all sockets are non-blocking and progress
//! only happens when the user reports readiness via
//! [`Engine::process_fd`] or expired timeouts via
//! [`Engine::process_timeouts`].

use super::server::{ServerList, ServerListCounter};
use super::{Answer, Engine, EngineEvents, Interest, QueryToken};
use crate::conf::{ResolvConf, ResolvOptions, ServerConf};
use crate::error::ResolveError;
use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::{Message, MessageBuilder, Name};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace, warn};

//------------ Configuration Constants ---------------------------------------

/// How many times do we try a new random port if we get ‘address in use.’
const RETRY_RANDOM_PORT: usize = 10;

/// The size of the chunks we read from stream sockets.
const READ_CHUNK: usize = 4096;

//------------ StubEngine ----------------------------------------------------

/// A stub resolver engine using UDP and TCP.
///
/// Each query uses its own socket. The engine goes through the configured
/// servers, first using the preferred (datagram) servers and switching to
/// the stream servers if an answer comes back truncated. It makes
/// `attempts` rounds through the server list before giving up.
#[derive(Debug)]
pub struct StubEngine {
    /// The server lists and options.
    servers: Servers,

    /// The queries currently in flight.
    queries: HashMap<QueryToken, Query>,

    /// The query each open socket belongs to.
    sockets: HashMap<RawFd, QueryToken>,
}

#[derive(Debug)]
struct Servers {
    /// Preferred servers.
    preferred: ServerList,

    /// Streaming servers.
    stream: ServerList,

    /// Resolver options.
    options: ResolvOptions,
}

impl StubEngine {
    /// Creates a new engine from the given configuration.
    ///
    /// Fails if the configuration doesn’t contain any servers. The
    /// configuration should have been finalized.
    pub fn new(conf: &ResolvConf) -> Result<Self, ResolveError> {
        let servers = Servers {
            preferred: ServerList::from_conf(conf, |s| {
                s.transport.is_preferred()
            }),
            stream: ServerList::from_conf(conf, |s| s.transport.is_stream()),
            options: conf.options.clone(),
        };
        if servers.preferred.is_empty() && servers.stream.is_empty() {
            return Err(ResolveError::NoServer);
        }
        Ok(StubEngine {
            servers,
            queries: HashMap::new(),
            sockets: HashMap::new(),
        })
    }

    /// Returns the options the engine was created with.
    pub fn options(&self) -> &ResolvOptions {
        &self.servers.options
    }

    /// Returns the number of queries currently in flight.
    pub fn pending(&self) -> usize {
        self.queries.len()
    }

    /// Starts an exchange with the current server of a query.
    ///
    /// Moves on to the next server if the socket cannot be created and
    /// finishes the query if there are no servers left.
    fn start_exchange(
        &mut self,
        token: QueryToken,
        events: &mut dyn EngineEvents,
    ) {
        loop {
            let Some(query) = self.queries.get_mut(&token) else {
                return;
            };
            let server = query.current_server(&self.servers);
            match Conn::open(server, query.request.as_slice()) {
                Ok(conn) => {
                    let fd = conn.as_raw_fd();
                    let interest = conn.interest();
                    debug!(
                        %token, server = %server.addr, fd,
                        "sending query"
                    );
                    query.deadline = Instant::now() + server.request_timeout;
                    query.conn = Some(conn);
                    self.sockets.insert(fd, token);
                    events.socket_state(fd, interest);
                    return;
                }
                Err(err) => {
                    debug!(
                        %token, server = %server.addr,
                        "failed to contact server: {}", err
                    );
                    query.update_error(ResolveError::ConnRefused);
                    if !query.next_server(&mut self.servers) {
                        let err = query.error;
                        self.finish(token, Err(err), events);
                        return;
                    }
                }
            }
        }
    }

    /// Closes the socket of a query if it has one.
    fn close_conn(
        &mut self,
        token: QueryToken,
        events: &mut dyn EngineEvents,
    ) {
        let Some(query) = self.queries.get_mut(&token) else {
            return;
        };
        if let Some(conn) = query.conn.take() {
            let fd = conn.as_raw_fd();
            self.sockets.remove(&fd);
            events.socket_state(fd, Interest::NONE);
            drop(conn);
        }
    }

    /// Moves a query on to the next server after a failed exchange.
    fn advance(&mut self, token: QueryToken, events: &mut dyn EngineEvents) {
        let Some(query) = self.queries.get_mut(&token) else {
            return;
        };
        if query.next_server(&mut self.servers) {
            self.start_exchange(token, events)
        } else {
            let err = query.error;
            self.finish(token, Err(err), events)
        }
    }

    /// Evaluates a response received for a query.
    fn evaluate(
        &mut self,
        token: QueryToken,
        answer: Answer,
        events: &mut dyn EngineEvents,
    ) {
        let Some(query) = self.queries.get_mut(&token) else {
            return;
        };
        let rcode = answer.header().rcode().to_int();
        trace!(%token, rcode, tc = answer.is_truncated(), "received answer");
        match rcode {
            RCODE_SERVFAIL | RCODE_NOTIMP | RCODE_REFUSED => {
                query.update_error(rcode_error(rcode));
                self.advance(token, events);
                return;
            }
            _ => {}
        }
        if answer.is_truncated()
            && query.preferred
            && !self.servers.options.ign_tc
            && query.switch_to_stream(&mut self.servers)
        {
            debug!(%token, "truncated answer, switching to stream");
            self.start_exchange(token, events);
            return;
        }
        let res = match rcode {
            RCODE_NOERROR => {
                if answer.header_counts().ancount() == 0 {
                    Err(ResolveError::NoData)
                } else {
                    Ok(answer)
                }
            }
            _ => Err(rcode_error(rcode)),
        };
        self.finish(token, res, events)
    }

    /// Gives up on the exchange of a query after a socket error.
    fn fail_exchange(
        &mut self,
        token: QueryToken,
        fd: RawFd,
        err: io::Error,
        events: &mut dyn EngineEvents,
    ) {
        debug!(%token, fd, "exchange failed: {}", err);
        self.close_conn(token, events);
        if let Some(query) = self.queries.get_mut(&token) {
            query.update_error(ResolveError::ConnRefused);
        }
        self.advance(token, events);
    }

    /// Removes a query and reports its result.
    fn finish(
        &mut self,
        token: QueryToken,
        res: Result<Answer, ResolveError>,
        events: &mut dyn EngineEvents,
    ) {
        self.close_conn(token, events);
        if self.queries.remove(&token).is_none() {
            return;
        }
        match res {
            Ok(_) => debug!(%token, "query succeeded"),
            Err(err) => debug!(%token, "query failed: {}", err.code()),
        }
        events.query_done(token, res)
    }
}

impl Engine for StubEngine {
    fn submit(
        &mut self,
        token: QueryToken,
        qname: &str,
        rtype: Rtype,
        events: &mut dyn EngineEvents,
    ) -> Result<(), ResolveError> {
        let request =
            build_request(qname, rtype, self.servers.options.recurse)?;
        let query = Query::new(request, &mut self.servers)?;
        if self.queries.insert(token, query).is_some() {
            warn!(%token, "duplicate query token");
        }
        debug!(%token, qname, %rtype, "starting query");
        self.start_exchange(token, events);
        Ok(())
    }

    fn process_fd(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
        events: &mut dyn EngineEvents,
    ) {
        let Some(&token) = self.sockets.get(&fd) else {
            trace!(fd, "readiness for unknown socket");
            return;
        };
        let Some(query) = self.queries.get_mut(&token) else {
            return;
        };
        let Some(conn) = query.conn.as_mut() else {
            return;
        };
        match conn.process(readable, writable, &query.request) {
            Progress::Pending(None) => {}
            Progress::Pending(Some(interest)) => {
                events.socket_state(fd, interest)
            }
            Progress::Response(answer) => {
                self.close_conn(token, events);
                self.evaluate(token, answer, events);
            }
            Progress::Failed(err) => {
                self.fail_exchange(token, fd, err, events)
            }
        }
    }

    fn process_fd_error(
        &mut self,
        fd: RawFd,
        err: io::Error,
        events: &mut dyn EngineEvents,
    ) {
        match self.sockets.get(&fd) {
            Some(&token) => self.fail_exchange(token, fd, err, events),
            None => trace!(fd, "error for unknown socket"),
        }
    }

    fn next_timeout(&self) -> Option<Instant> {
        self.queries
            .values()
            .filter(|query| query.conn.is_some())
            .map(|query| query.deadline)
            .min()
    }

    fn process_timeouts(
        &mut self,
        now: Instant,
        events: &mut dyn EngineEvents,
    ) {
        let expired: Vec<_> = self
            .queries
            .iter()
            .filter(|(_, query)| {
                query.conn.is_some() && query.deadline <= now
            })
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            trace!(%token, "exchange timed out");
            self.close_conn(token, events);
            if let Some(query) = self.queries.get_mut(&token) {
                query.update_error(ResolveError::Timeout);
            }
            self.advance(token, events);
        }
    }
}

//------------ Query ---------------------------------------------------------

#[derive(Debug)]
struct Query {
    /// The request message.
    request: Message<Vec<u8>>,

    /// Are we still in the preferred server list or have gone streaming?
    preferred: bool,

    /// The number of attempts, starting with zero.
    attempt: usize,

    /// The index in the server list we are currently trying.
    counter: ServerListCounter,

    /// The socket of the current exchange.
    conn: Option<Conn>,

    /// When the current exchange times out.
    deadline: Instant,

    /// The error to return if we finally have to fail.
    ///
    /// We start out with a timeout so that is what we get if everything
    /// times out.
    error: ResolveError,
}

impl Query {
    fn new(
        request: Message<Vec<u8>>,
        servers: &mut Servers,
    ) -> Result<Self, ResolveError> {
        let rotate = servers.options.rotate;
        let (preferred, counter) =
            if servers.options.use_vc || servers.preferred.is_empty() {
                if servers.stream.is_empty() {
                    return Err(ResolveError::NoServer);
                }
                (false, servers.stream.counter(rotate))
            } else {
                (true, servers.preferred.counter(rotate))
            };
        Ok(Query {
            request,
            preferred,
            attempt: 0,
            counter,
            conn: None,
            deadline: Instant::now(),
            error: ResolveError::Timeout,
        })
    }

    fn current_server<'a>(&self, servers: &'a Servers) -> &'a ServerConf {
        let list = if self.preferred {
            &servers.preferred
        } else {
            &servers.stream
        };
        self.counter.info(list)
    }

    fn update_error(&mut self, err: ResolveError) {
        // Timeouts never replace anything. Socket errors only replace other
        // socket errors or the initial timeout. Errors from an actual answer
        // always win.
        match err {
            ResolveError::Timeout => {}
            ResolveError::ConnRefused => {
                if matches!(
                    self.error,
                    ResolveError::Timeout | ResolveError::ConnRefused
                ) {
                    self.error = err
                }
            }
            _ => self.error = err,
        }
    }

    fn switch_to_stream(&mut self, servers: &mut Servers) -> bool {
        if !self.preferred || servers.stream.is_empty() {
            return false;
        }
        self.preferred = false;
        self.attempt = 0;
        self.counter = servers.stream.counter(servers.options.rotate);
        true
    }

    fn next_server(&mut self, servers: &mut Servers) -> bool {
        if self.counter.next() {
            return true;
        }
        self.attempt += 1;
        if self.attempt >= servers.options.attempts {
            return false;
        }
        let rotate = servers.options.rotate;
        self.counter = if self.preferred {
            servers.preferred.counter(rotate)
        } else {
            servers.stream.counter(rotate)
        };
        true
    }
}

//------------ Conn ----------------------------------------------------------

/// The socket of a single exchange with a server.
#[derive(Debug)]
enum Conn {
    Udp(UdpConn),
    Tcp(TcpConn),
}

/// The outcome of processing a readiness event.
enum Progress {
    /// The exchange continues, possibly with a new interest.
    Pending(Option<Interest>),

    /// A response to the query has arrived.
    Response(Answer),

    /// The exchange has failed.
    Failed(io::Error),
}

impl Conn {
    fn open(server: &ServerConf, request: &[u8]) -> Result<Self, io::Error> {
        if server.transport.is_stream() {
            TcpConn::open(server.addr, request).map(Conn::Tcp)
        } else {
            UdpConn::open(server, request).map(Conn::Udp)
        }
    }

    fn interest(&self) -> Interest {
        match self {
            Conn::Udp(_) => Interest::READ,
            Conn::Tcp(conn) => conn.interest(),
        }
    }

    fn process(
        &mut self,
        readable: bool,
        writable: bool,
        request: &Message<Vec<u8>>,
    ) -> Progress {
        match self {
            Conn::Udp(conn) => {
                if readable {
                    conn.recv(request)
                } else {
                    Progress::Pending(None)
                }
            }
            Conn::Tcp(conn) => conn.process(readable, writable, request),
        }
    }
}

impl AsRawFd for Conn {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Conn::Udp(conn) => conn.sock.as_raw_fd(),
            Conn::Tcp(conn) => conn.sock.as_raw_fd(),
        }
    }
}

//------------ UdpConn -------------------------------------------------------

#[derive(Debug)]
struct UdpConn {
    sock: UdpSocket,
    recv_size: usize,
}

impl UdpConn {
    fn open(server: &ServerConf, request: &[u8]) -> Result<Self, io::Error> {
        let sock = Self::bind(server.addr.is_ipv4())?;
        sock.connect(server.addr)?;
        sock.set_nonblocking(true)?;
        let sent = sock.send(request)?;
        if sent != request.len() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "short UDP send",
            ));
        }
        Ok(UdpConn {
            sock,
            recv_size: server.recv_size,
        })
    }

    fn bind(v4: bool) -> Result<UdpSocket, io::Error> {
        let mut i = 0;
        loop {
            let local: SocketAddr = if v4 {
                ([0u8; 4], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            match UdpSocket::bind(local) {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    if i == RETRY_RANDOM_PORT {
                        return Err(err);
                    } else {
                        i += 1
                    }
                }
            }
        }
    }

    fn recv(&mut self, request: &Message<Vec<u8>>) -> Progress {
        let mut buf = vec![0; self.recv_size];
        loop {
            let len = match self.sock.recv(&mut buf) {
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Progress::Pending(None)
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue
                }
                Err(err) => return Progress::Failed(err),
            };
            let answer = match Answer::from_octets(Bytes::copy_from_slice(
                &buf[..len],
            )) {
                Ok(answer) => answer,
                Err(_) => {
                    trace!("ignoring unparseable datagram");
                    continue;
                }
            };
            if !answer.is_answer(request) {
                trace!("ignoring datagram that isn’t an answer");
                continue;
            }
            return Progress::Response(answer);
        }
    }
}

//------------ TcpConn -------------------------------------------------------

#[derive(Debug)]
struct TcpConn {
    sock: Socket,

    /// The length-prefixed request.
    request: Vec<u8>,

    /// How much of the request has been written.
    written: usize,

    /// The data received so far.
    buf: Vec<u8>,
}

impl TcpConn {
    fn open(addr: SocketAddr, request: &[u8]) -> Result<Self, io::Error> {
        let len = u16::try_from(request.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "request too long")
        })?;
        let sock = Socket::new(
            Domain::for_address(addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        sock.set_nonblocking(true)?;
        match sock.connect(&SockAddr::from(addr)) {
            Ok(()) => {}
            Err(err)
                if err.raw_os_error() == Some(libc::EINPROGRESS)
                    || err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }
        let mut framed = Vec::with_capacity(request.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(request);
        Ok(TcpConn {
            sock,
            request: framed,
            written: 0,
            buf: Vec::new(),
        })
    }

    fn interest(&self) -> Interest {
        if self.written < self.request.len() {
            Interest::READ_WRITE
        } else {
            Interest::READ
        }
    }

    fn process(
        &mut self,
        readable: bool,
        writable: bool,
        request: &Message<Vec<u8>>,
    ) -> Progress {
        let before = self.interest();
        if writable && self.written < self.request.len() {
            match self.sock.take_error() {
                Ok(None) => {}
                Ok(Some(err)) | Err(err) => return Progress::Failed(err),
            }
            if let Err(err) = self.write() {
                return Progress::Failed(err);
            }
        }
        if readable {
            match self.read(request) {
                Ok(Some(answer)) => return Progress::Response(answer),
                Ok(None) => {}
                Err(err) => return Progress::Failed(err),
            }
        }
        let after = self.interest();
        Progress::Pending((before != after).then_some(after))
    }

    fn write(&mut self) -> Result<(), io::Error> {
        while self.written < self.request.len() {
            match self.sock.send(&self.request[self.written..]) {
                Ok(len) => self.written += len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn read(
        &mut self,
        request: &Message<Vec<u8>>,
    ) -> Result<Option<Answer>, io::Error> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(answer) = self.take_message(request) {
                return Ok(Some(answer));
            }
            match self.sock.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by server",
                    ))
                }
                Ok(len) => self.buf.extend_from_slice(&chunk[..len]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(None)
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Takes complete messages off the buffer until an answer is found.
    fn take_message(
        &mut self,
        request: &Message<Vec<u8>>,
    ) -> Option<Answer> {
        loop {
            if self.buf.len() < 2 {
                return None;
            }
            let len =
                usize::from(u16::from_be_bytes([self.buf[0], self.buf[1]]));
            if self.buf.len() < len + 2 {
                return None;
            }
            let octets = Bytes::copy_from_slice(&self.buf[2..len + 2]);
            self.buf.drain(..len + 2);
            match Answer::from_octets(octets) {
                Ok(answer) if answer.is_answer(request) => {
                    return Some(answer)
                }
                _ => trace!("ignoring stream message that isn’t an answer"),
            }
        }
    }
}

//------------ Helpers -------------------------------------------------------

const RCODE_NOERROR: u8 = 0;
const RCODE_FORMERR: u8 = 1;
const RCODE_SERVFAIL: u8 = 2;
const RCODE_NXDOMAIN: u8 = 3;
const RCODE_NOTIMP: u8 = 4;
const RCODE_REFUSED: u8 = 5;

/// Returns the error for a response code other than NOERROR.
fn rcode_error(rcode: u8) -> ResolveError {
    match rcode {
        RCODE_FORMERR => ResolveError::FormErr,
        RCODE_SERVFAIL => ResolveError::ServFail,
        RCODE_NXDOMAIN => ResolveError::NotFound,
        RCODE_NOTIMP => ResolveError::NotImp,
        RCODE_REFUSED => ResolveError::Refused,
        _ => ResolveError::BadResp,
    }
}

/// Creates the request message for a query.
fn build_request(
    qname: &str,
    rtype: Rtype,
    recurse: bool,
) -> Result<Message<Vec<u8>>, ResolveError> {
    let qname =
        Name::<Vec<u8>>::from_str(qname).map_err(|_| ResolveError::BadName)?;
    let mut message = MessageBuilder::new_vec();
    message.header_mut().set_id(rand::random());
    message.header_mut().set_rd(recurse);
    let mut message = message.question();
    message
        .push((qname, rtype))
        .map_err(|_| ResolveError::BadName)?;
    Message::from_octets(message.finish()).map_err(|_| ResolveError::BadName)
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        states: Vec<(RawFd, Interest)>,
        done: Vec<(QueryToken, Result<Answer, ResolveError>)>,
    }

    impl EngineEvents for Recorder {
        fn socket_state(&mut self, fd: RawFd, interest: Interest) {
            self.states.push((fd, interest))
        }

        fn query_done(
            &mut self,
            token: QueryToken,
            answer: Result<Answer, ResolveError>,
        ) {
            self.done.push((token, answer))
        }
    }

    #[test]
    fn request_message() {
        let msg = build_request("example.com", Rtype::TXT, true).unwrap();
        assert!(msg.header().rd());
        assert_eq!(msg.header_counts().qdcount(), 1);
        let question = msg.first_question().unwrap();
        assert_eq!(question.qtype(), Rtype::TXT);
    }

    #[test]
    fn bad_name() {
        let long = "a".repeat(64);
        assert_eq!(
            build_request(&long, Rtype::TXT, true).unwrap_err(),
            ResolveError::BadName
        );
    }

    #[test]
    fn no_servers() {
        assert_eq!(
            StubEngine::new(&ResolvConf::new()).unwrap_err(),
            ResolveError::NoServer
        );
    }

    #[test]
    fn submit_opens_udp_socket() {
        let conf =
            ResolvConf::with_servers(["127.0.0.1:53".parse().unwrap()]);
        let mut engine = StubEngine::new(&conf).unwrap();
        let mut events = Recorder::default();
        let token = QueryToken::from_u64(1);
        engine
            .submit(token, "example.com", Rtype::TXT, &mut events)
            .unwrap();
        assert_eq!(events.states.len(), 1);
        assert_eq!(events.states[0].1, Interest::READ);
        assert!(events.done.is_empty());
        assert!(engine.next_timeout().is_some());
        assert_eq!(engine.pending(), 1);
    }

    #[test]
    fn socket_error_moves_on() {
        let mut conf = ResolvConf::with_servers([
            "127.0.0.1:53".parse().unwrap(),
            "127.0.0.2:53".parse().unwrap(),
        ]);
        conf.options.attempts = 1;
        let mut engine = StubEngine::new(&conf).unwrap();
        let mut events = Recorder::default();
        let token = QueryToken::from_u64(1);
        engine
            .submit(token, "example.com", Rtype::TXT, &mut events)
            .unwrap();
        let (fd, _) = events.states[0];

        // The first server’s socket fails, the second one is tried.
        let err = io::Error::new(io::ErrorKind::Other, "gone");
        engine.process_fd_error(fd, err, &mut events);
        assert_eq!(events.states[1], (fd, Interest::NONE));
        assert_eq!(events.states[2].1, Interest::READ);
        assert!(events.done.is_empty());

        // Then there’s nothing left.
        let (fd, _) = events.states[2];
        let err = io::Error::new(io::ErrorKind::Other, "gone");
        engine.process_fd_error(fd, err, &mut events);
        assert_eq!(events.done.len(), 1);
        assert_eq!(
            events.done[0].1.as_ref().unwrap_err(),
            &ResolveError::ConnRefused
        );
        assert_eq!(engine.pending(), 0);

        // Unknown sockets are ignored.
        let err = io::Error::new(io::ErrorKind::Other, "gone");
        engine.process_fd_error(fd, err, &mut events);
        assert_eq!(events.done.len(), 1);
    }

    #[test]
    fn rcode_mapping() {
        assert_eq!(rcode_error(RCODE_NXDOMAIN), ResolveError::NotFound);
        assert_eq!(rcode_error(RCODE_FORMERR), ResolveError::FormErr);
        assert_eq!(rcode_error(9), ResolveError::BadResp);
    }

    #[test]
    fn error_preference() {
        let conf =
            ResolvConf::with_servers(["127.0.0.1:53".parse().unwrap()]);
        let mut engine = StubEngine::new(&conf).unwrap();
        let request = build_request("example.com", Rtype::TXT, true).unwrap();
        let mut query = Query::new(request, &mut engine.servers).unwrap();
        query.update_error(ResolveError::Timeout);
        assert_eq!(query.error, ResolveError::Timeout);
        query.update_error(ResolveError::ConnRefused);
        assert_eq!(query.error, ResolveError::ConnRefused);
        query.update_error(ResolveError::ServFail);
        assert_eq!(query.error, ResolveError::ServFail);
        query.update_error(ResolveError::ConnRefused);
        assert_eq!(query.error, ResolveError::ServFail);
    }
}
