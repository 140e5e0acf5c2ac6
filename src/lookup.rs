//! Looking up host addresses through the system resolver.
//!
//! Address lookups don’t use the stub resolver engine. Instead, they go
//! through `getaddrinfo(3)` so that they honour the system’s entire name
//! service configuration, including `/etc/hosts`. Because that function
//! blocks, it is run on Tokio’s blocking thread pool.
//!
//! Lookups take part in the environment’s teardown. If teardown starts
//! while a lookup is still running, the lookup is cancelled if it hasn’t
//! started yet or else allowed to finish. Either way, its continuation is
//! not called.

use crate::env::Env;
use crate::error::LookupError;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::ffi::CString;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::rc::Rc;
use std::str::FromStr;
use std::{fmt, mem, panic, ptr};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

//------------ Family --------------------------------------------------------

/// The address family to look up.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Family {
    /// Any family.
    #[default]
    Any,

    /// IPv4 addresses only.
    V4,

    /// IPv6 addresses only.
    V6,
}

impl Family {
    /// Returns the `AF_*` value for the family.
    pub fn to_libc(self) -> libc::c_int {
        match self {
            Family::Any => libc::AF_UNSPEC,
            Family::V4 => libc::AF_INET,
            Family::V6 => libc::AF_INET6,
        }
    }
}

/// Converts the IP version number into a family.
///
/// Anything other than 4 or 6 means any family.
impl From<u8> for Family {
    fn from(version: u8) -> Self {
        match version {
            4 => Family::V4,
            6 => Family::V6,
            _ => Family::Any,
        }
    }
}

/// Parses `"IPv4"` or `"IPv6"`.
///
/// Anything else means any family.
impl FromStr for Family {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "IPv4" => Family::V4,
            "IPv6" => Family::V6,
            _ => Family::Any,
        })
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Family::Any => "any",
            Family::V4 => "IPv4",
            Family::V6 => "IPv6",
        })
    }
}

//------------ LookupOptions -------------------------------------------------

/// Options for an address lookup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LookupOptions {
    /// The address family to look up.
    pub family: Family,

    /// Return all addresses rather than only the first one.
    pub all: bool,
}

impl LookupOptions {
    pub fn new(family: Family, all: bool) -> Self {
        LookupOptions { family, all }
    }
}

//------------ LookupAddress -------------------------------------------------

/// An address found by a lookup.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LookupAddress {
    pub address: IpAddr,
}

impl LookupAddress {
    /// Returns the IP version of the address, either 4 or 6.
    pub fn family(&self) -> u8 {
        match self.address {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }
}

impl From<IpAddr> for LookupAddress {
    fn from(address: IpAddr) -> Self {
        LookupAddress { address }
    }
}

impl fmt::Display for LookupAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.address.fmt(f)
    }
}

//------------ Hints ---------------------------------------------------------

/// The hints passed to `getaddrinfo(3)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hints {
    /// The address family.
    pub family: Family,

    /// The socket type, one of the `SOCK_*` values.
    pub socktype: libc::c_int,
}

impl Hints {
    /// Returns the hints for looking up stream sockets of a family.
    pub fn stream(family: Family) -> Self {
        Hints {
            family,
            socktype: libc::SOCK_STREAM,
        }
    }
}

//------------ AddrInfo ------------------------------------------------------

/// One entry of the result of `getaddrinfo(3)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddrInfo {
    /// The address.
    pub addr: ResolvedAddr,

    /// The socket type, one of the `SOCK_*` values.
    pub socktype: libc::c_int,
}

impl AddrInfo {
    pub fn new(addr: ResolvedAddr, socktype: libc::c_int) -> Self {
        AddrInfo { addr, socktype }
    }
}

/// The address of an entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),

    /// An address of some other family, given as its `AF_*` value.
    Unsupported(libc::c_int),
}

impl ResolvedAddr {
    /// Returns the IP address if this is one.
    pub fn ip(self) -> Option<IpAddr> {
        match self {
            ResolvedAddr::V4(addr) => Some(addr.into()),
            ResolvedAddr::V6(addr) => Some(addr.into()),
            ResolvedAddr::Unsupported(_) => None,
        }
    }

    /// Converts the address of a raw result entry.
    ///
    /// # Safety
    ///
    /// If `ai_addr` is not null, it must point to a socket address of the
    /// family given in `ai_family`.
    unsafe fn from_raw(info: &libc::addrinfo) -> Self {
        if info.ai_addr.is_null() {
            return ResolvedAddr::Unsupported(info.ai_family);
        }
        match info.ai_family {
            libc::AF_INET => {
                let sin = &*(info.ai_addr as *const libc::sockaddr_in);
                ResolvedAddr::V4(Ipv4Addr::from(u32::from_be(
                    sin.sin_addr.s_addr,
                )))
            }
            libc::AF_INET6 => {
                let sin6 = &*(info.ai_addr as *const libc::sockaddr_in6);
                ResolvedAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr))
            }
            family => ResolvedAddr::Unsupported(family),
        }
    }
}

//------------ AddrSource ----------------------------------------------------

/// A source of address information.
///
/// The source is called on the blocking thread pool and may block.
pub trait AddrSource: Send + Sync + 'static {
    /// Looks up the addresses of `host`.
    fn getaddrinfo(
        &self,
        host: &str,
        hints: &Hints,
    ) -> Result<Vec<AddrInfo>, LookupError>;
}

//------------ SystemAddrSource ----------------------------------------------

/// The system resolver via `getaddrinfo(3)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAddrSource;

impl AddrSource for SystemAddrSource {
    fn getaddrinfo(
        &self,
        host: &str,
        hints: &Hints,
    ) -> Result<Vec<AddrInfo>, LookupError> {
        let host = CString::new(host)
            .map_err(|_| LookupError::from_gai(libc::EAI_NONAME))?;

        // SAFETY: all-zero is a valid value for addrinfo.
        let mut raw_hints: libc::addrinfo = unsafe { mem::zeroed() };
        raw_hints.ai_family = hints.family.to_libc();
        raw_hints.ai_socktype = hints.socktype;

        let mut list: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call.
        let err = unsafe {
            libc::getaddrinfo(
                host.as_ptr(),
                ptr::null(),
                &raw_hints,
                &mut list,
            )
        };
        if err != 0 {
            return Err(LookupError::from_gai(err));
        }

        let mut res = Vec::new();
        let mut cur = list;
        while !cur.is_null() {
            // SAFETY: getaddrinfo returned a valid linked list which we only
            //         free below.
            let info = unsafe { &*cur };
            res.push(AddrInfo {
                addr: unsafe { ResolvedAddr::from_raw(info) },
                socktype: info.ai_socktype,
            });
            cur = info.ai_next;
        }
        // SAFETY: list came from a successful getaddrinfo call.
        unsafe { libc::freeaddrinfo(list) };
        Ok(res)
    }
}

//------------ collect_addresses ---------------------------------------------

/// Converts the result of `getaddrinfo(3)` into the lookup result.
///
/// Only stream socket entries with an IPv4 or IPv6 address are used, in the
/// order they were returned. Unless `all` is set, only the first of those
/// is kept. It is an error if there are none.
pub fn collect_addresses(
    infos: impl IntoIterator<Item = AddrInfo>,
    all: bool,
) -> Result<Vec<LookupAddress>, LookupError> {
    let addrs = infos
        .into_iter()
        .filter(|info| info.socktype == libc::SOCK_STREAM)
        .filter_map(|info| info.addr.ip())
        .map(LookupAddress::from);
    let res: Vec<_> = if all {
        addrs.collect()
    } else {
        addrs.take(1).collect()
    };
    if res.is_empty() {
        Err(LookupError::no_data())
    } else {
        Ok(res)
    }
}

//------------ LookupOperation -----------------------------------------------

/// The state of a lookup shared with the teardown hook.
#[derive(Default)]
struct LookupState {
    /// Has teardown started?
    exiting: Cell<bool>,

    /// The handle for cancelling the blocking job.
    abort: RefCell<Option<AbortHandle>>,
}

impl LookupState {
    fn teardown(&self) {
        trace!("environment teardown, cancelling lookup");
        self.exiting.set(true);
        if let Some(abort) = self.abort.borrow().as_ref() {
            abort.abort()
        }
    }
}

//------------ lookup_with ---------------------------------------------------

/// Looks up the addresses of `hostname` and calls `callback` with them.
///
/// This needs to be called from within a Tokio `LocalSet`. The callback is
/// called from a local task once the lookup has finished, unless the
/// environment has started tearing down by then.
///
/// Fails if teardown has already started.
pub fn lookup_with<F>(
    env: &Env,
    hostname: &str,
    options: LookupOptions,
    callback: F,
) -> Result<(), LookupError>
where
    F: FnOnce(Result<Vec<LookupAddress>, LookupError>) + 'static,
{
    let state = Rc::new(LookupState::default());
    let teardown = {
        let state = state.clone();
        env.coordinator()
            .add(move || state.teardown())
            .map_err(|_| LookupError::shutdown())?
    };

    let source = env.addr_source();
    let host = hostname.to_owned();
    let hints = Hints::stream(options.family);
    let all = options.all;
    debug!(host = hostname, family = %options.family, all, "starting lookup");
    let job = tokio::task::spawn_blocking(move || {
        source.getaddrinfo(&host, &hints)
    });
    *state.abort.borrow_mut() = Some(job.abort_handle());

    tokio::task::spawn_local(async move {
        let res = match job.await {
            Ok(res) => res.and_then(|infos| collect_addresses(infos, all)),
            Err(err) if err.is_cancelled() => Err(LookupError::cancelled()),
            Err(err) => panic::resume_unwind(err.into_panic()),
        };
        if state.exiting.get() {
            debug!("lookup finished during teardown, dropping result");
            drop(callback);
        } else {
            callback(res);
        }
        teardown.finish();
    });
    Ok(())
}

/// Looks up the addresses of `hostname`.
///
/// If the environment tears down before the lookup has finished, it fails
/// with a cancelled error.
pub async fn lookup(
    env: &Env,
    hostname: &str,
    options: LookupOptions,
) -> Result<Vec<LookupAddress>, LookupError> {
    let (tx, rx) = oneshot::channel();
    lookup_with(env, hostname, options, move |res| {
        let _ = tx.send(res);
    })?;
    rx.await.unwrap_or_else(|_| Err(LookupError::cancelled()))
}

/// Looks up the first address of `hostname`.
pub async fn lookup_one(
    env: &Env,
    hostname: &str,
    family: Family,
) -> Result<LookupAddress, LookupError> {
    let mut res =
        lookup(env, hostname, LookupOptions::new(family, false)).await?;
    match res.pop() {
        Some(addr) => Ok(addr),
        None => Err(LookupError::no_data()),
    }
}

//============ Testing =======================================================
