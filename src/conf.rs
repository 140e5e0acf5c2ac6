//! Resolver configuration.
//!
//! The configuration of the stub resolver engine is modeled along the lines
//! of glibc’s resolver: a list of upstream servers plus a set of options.
//! It is normally read from the system’s `/etc/resolv.conf` which happens
//! only once per process through [`system_conf`].
//!
//! Since the engine sends queries for exactly the name it is given, the
//! search list related directives (`domain`, `search`, `ndots`) are
//! accepted when parsing but have no effect.

use std::io::{BufRead, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::SplitWhitespace;
use std::sync::OnceLock;
use std::time::Duration;
use std::{error, fmt, fs, io};
use tracing::debug;

//------------ Module Configuration ------------------------------------------

/// The path of the system configuration file.
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// The default timeout for a single exchange with a server.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of rounds through the server list.
const DEFAULT_ATTEMPTS: usize = 2;

//------------ system_conf ---------------------------------------------------

/// Returns the system’s resolver configuration.
///
/// The configuration is read from `/etc/resolv.conf` the first time this
/// function is called. Later calls return the same value. If the file
/// cannot be read, a default configuration pointing to `127.0.0.1:53` is
/// used.
pub fn system_conf() -> &'static ResolvConf {
    static SYSTEM_CONF: OnceLock<ResolvConf> = OnceLock::new();
    SYSTEM_CONF.get_or_init(|| {
        let mut conf = ResolvConf::new();
        if let Err(err) = conf.parse_file(RESOLV_CONF) {
            debug!("cannot read {}: {}", RESOLV_CONF, err);
        }
        conf.finalize();
        conf
    })
}

//------------ ResolvOptions -------------------------------------------------

/// Options for the resolver configuration.
///
/// This type collects the server-independent options of glibc’s resolver
/// that affect how the engine performs a single query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvOptions {
    /// Timeout to wait for a response from a single server.
    pub timeout: Duration,

    /// Number of rounds through the server list before giving up.
    pub attempts: usize,

    /// Always use TCP.
    pub use_vc: bool,

    /// Ignore truncation, don’t retry with TCP.
    pub ign_tc: bool,

    /// Set the recursion desired bit in queries.
    ///
    /// Enabled by default.
    pub recurse: bool,

    /// Use round-robin selection of name servers.
    pub rotate: bool,
}

impl Default for ResolvOptions {
    fn default() -> Self {
        ResolvOptions {
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            use_vc: false,
            ign_tc: false,
            recurse: true,
            rotate: false,
        }
    }
}

//------------ Transport -----------------------------------------------------

/// The transport protocol to be used for a server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transport {
    /// Unencrypted UDP transport.
    Udp,

    /// Unencrypted TCP transport.
    Tcp,
}

impl Transport {
    /// Returns whether the transport is a preferred transport.
    ///
    /// Only preferred transports are considered initially. Only if a
    /// truncated answer comes back will we consider streaming protocols
    /// instead.
    pub fn is_preferred(self) -> bool {
        matches!(self, Transport::Udp)
    }

    /// Returns whether the transport is a streaming protocol.
    pub fn is_stream(self) -> bool {
        matches!(self, Transport::Tcp)
    }
}

//------------ ServerConf ----------------------------------------------------

/// Configuration for one upstream DNS server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConf {
    /// Server address.
    pub addr: SocketAddr,

    /// Transport protocol.
    pub transport: Transport,

    /// How long to wait for a response before moving on.
    pub request_timeout: Duration,

    /// Size of the message receive buffer in bytes.
    ///
    /// This is used for datagram transports only.
    pub recv_size: usize,
}

impl ServerConf {
    /// Returns a new default server config for the given address.
    pub fn new(addr: SocketAddr, transport: Transport) -> Self {
        ServerConf {
            addr,
            transport,
            request_timeout: DEFAULT_TIMEOUT,
            recv_size: 65535,
        }
    }
}

//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// After creating a value with [`ResolvConf::new`] you can manipulate the
/// members or parse a glibc-style configuration file through
/// [`parse`][Self::parse] or [`parse_file`][Self::parse_file]. Once you are
/// happy, call [`finalize`][Self::finalize] to make sure the configuration
/// is usable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvConf {
    /// Addresses of servers to query.
    pub servers: Vec<ServerConf>,

    /// Default options.
    pub options: ResolvOptions,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new, empty configuration.
    ///
    /// An empty configuration contains no servers and is rejected by the
    /// engine until [`finalize`][Self::finalize] has been called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration using UDP and TCP on the given servers.
    pub fn with_servers(
        servers: impl IntoIterator<Item = SocketAddr>,
    ) -> Self {
        let mut res = Self::new();
        for addr in servers {
            res.push_server(addr);
        }
        res.finalize();
        res
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, this adds `127.0.0.1:53` just like glibc
    /// does. It also copies the configured timeout into each server’s
    /// request timeout.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            self.push_server(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                53,
            ));
        }
        for server in &mut self.servers {
            server.request_timeout = self.options.timeout
        }
    }

    fn push_server(&mut self, addr: SocketAddr) {
        self.servers.push(ServerConf::new(addr, Transport::Udp));
        self.servers.push(ServerConf::new(addr, Transport::Tcp));
    }
}

/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                Some("domain") | Some("search") | Some("sortlist") => {}
                Some("options") => self.parse_options(words)?,
                _ => return Err(Error::ParseError),
            }
        }
        Ok(())
    }

    fn parse_nameserver(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        let host = next_word(&mut words)?;
        // Scoped addresses like fe80::1%eth0 are not supported.
        let host = host.split('%').next().unwrap_or(host);
        let addr: IpAddr = host.parse().map_err(|_| Error::ParseError)?;
        self.push_server(SocketAddr::new(addr, 53));
        no_more_words(words)
    }

    fn parse_options(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        for word in words {
            match split_arg(word)? {
                ("timeout", Some(n)) => {
                    self.options.timeout = Duration::from_secs(n as u64)
                }
                ("attempts", Some(n)) => self.options.attempts = n,
                ("rotate", None) => self.options.rotate = true,
                ("use-vc", None) => self.options.use_vc = true,
                ("ign-tc", None) => self.options.ign_tc = true,
                ("no-recurse", None) => self.options.recurse = false,
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
        Ok(())
    }
}

//--- Display

impl fmt::Display for ResolvConf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut last = None;
        for server in &self.servers {
            let addr = server.addr;
            // Each address appears twice, once per transport.
            if last == Some(addr) {
                continue;
            }
            last = Some(addr);
            if addr.port() == 53 {
                writeln!(f, "nameserver {}", addr.ip())?;
            } else {
                writeln!(f, "nameserver {}", addr)?;
            }
        }

        // Collect options so we only print them if there are any non-default
        // ones.
        let mut options = Vec::new();

        if self.options.timeout != DEFAULT_TIMEOUT {
            // XXX This ignores fractional seconds.
            options.push(format!("timeout:{}", self.options.timeout.as_secs()));
        }
        if self.options.attempts != DEFAULT_ATTEMPTS {
            options.push(format!("attempts:{}", self.options.attempts));
        }
        if self.options.rotate {
            options.push("rotate".into())
        }
        if self.options.use_vc {
            options.push("use-vc".into())
        }
        if self.options.ign_tc {
            options.push("ign-tc".into())
        }
        if !self.options.recurse {
            options.push("no-recurse".into())
        }

        if !options.is_empty() {
            f.write_str("options")?;
            for option in options {
                write!(f, " {}", option)?;
            }
            f.write_str("\n")?;
        }

        Ok(())
    }
}

//------------ Private Helpers -----------------------------------------------
//
// These are here to wrap stuff into Results.

/// Returns a reference to the next word or an error.
fn next_word<'a>(words: &mut SplitWhitespace<'a>) -> Result<&'a str, Error> {
    words.next().ok_or(Error::ParseError)
}

/// Returns nothing but errors out if there are words left.
fn no_more_words(mut words: SplitWhitespace) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::ParseError),
        None => Ok(()),
    }
}

/// Splits the name and argument from an option with arguments.
///
/// These options consist of a name followed by a colon followed by a
/// value, which so far is only `usize`, so we do that.
fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.split_once(':') {
        Some((left, right)) => {
            Ok((left, Some(right.parse().map_err(|_| Error::ParseError)?)))
        }
        None => Ok((s, None)),
    }
}

//------------ Error ---------------------------------------------------------

/// The error that can happen when parsing `resolv.conf`.
#[derive(Debug)]
pub enum Error {
    /// The file is not a proper file.
    ParseError,

    /// Something happend while reading.
    Io(io::Error),
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ParseError => f.write_str("error parsing configuration"),
            Error::Io(ref e) => e.fmt(f),
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::io;

    #[test]
    fn parse_resolv_conf() {
        let mut conf = ResolvConf::new();
        let data = "nameserver 192.0.2.0\n\
                    nameserver 192.0.2.1\n\
                    search example.com example.net\n\
                    options use-vc attempts:3 timeout:1 ndots:2\n"
            .to_string();
        conf.parse(&mut io::Cursor::new(data)).unwrap();
        conf.finalize();
        assert!(conf.options.use_vc);
        assert_eq!(conf.options.attempts, 3);
        assert_eq!(conf.servers.len(), 4);
        assert_eq!(conf.servers[0].addr, "192.0.2.0:53".parse().unwrap());
        assert_eq!(conf.servers[0].transport, Transport::Udp);
        assert_eq!(conf.servers[1].transport, Transport::Tcp);
        assert!(conf
            .servers
            .iter()
            .all(|s| s.request_timeout == Duration::from_secs(1)));
    }

    #[test]
    fn reject_garbage() {
        let mut conf = ResolvConf::new();
        let data = "nameserver\n".to_string();
        assert!(conf.parse(&mut io::Cursor::new(data)).is_err());
        let data = "frobnicate 192.0.2.1\n".to_string();
        assert!(conf.parse(&mut io::Cursor::new(data)).is_err());
    }

    #[test]
    fn finalize_empty() {
        let mut conf = ResolvConf::new();
        conf.finalize();
        assert_eq!(conf.servers.len(), 2);
        assert_eq!(conf.servers[0].addr, "127.0.0.1:53".parse().unwrap());
    }

    #[test]
    fn display_round_trip() {
        let mut conf = ResolvConf::new();
        let data = "nameserver 192.0.2.1\n\
                    nameserver 2001:db8::1\n\
                    options timeout:3 rotate no-recurse\n"
            .to_string();
        conf.parse(&mut io::Cursor::new(data)).unwrap();
        conf.finalize();

        let mut again = ResolvConf::new();
        again
            .parse(&mut io::Cursor::new(conf.to_string()))
            .unwrap();
        again.finalize();
        assert_eq!(conf, again);
    }
}
