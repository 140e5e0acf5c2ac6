//! The lists of upstream servers used by the stub engine.

use crate::conf::{ResolvConf, ServerConf};
use std::ops;

//------------ ServerList ----------------------------------------------------

#[derive(Clone, Debug)]
pub(super) struct ServerList {
    /// The actual list of servers.
    servers: Vec<ServerConf>,

    /// Where to start accessing the list.
    ///
    /// In rotate mode, this value keeps growing and has to be used modulo
    /// the length of `servers`. Wrapping around at the end of usize’s range
    /// causes a jump in rotation which we accept.
    start: usize,
}

impl ServerList {
    pub fn from_conf<F>(conf: &ResolvConf, filter: F) -> Self
    where
        F: Fn(&ServerConf) -> bool,
    {
        ServerList {
            servers: {
                conf.servers
                    .iter()
                    .filter(|f| filter(f))
                    .cloned()
                    .collect()
            },
            start: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Returns a counter for one round through the list.
    pub fn counter(&mut self, rotate: bool) -> ServerListCounter {
        let res = ServerListCounter::new(self);
        if rotate {
            self.start = self.start.wrapping_add(1);
        }
        res
    }
}

impl ops::Deref for ServerList {
    type Target = [ServerConf];

    fn deref(&self) -> &Self::Target {
        self.servers.as_ref()
    }
}

//------------ ServerListCounter ---------------------------------------------

#[derive(Clone, Copy, Debug)]
pub(super) struct ServerListCounter {
    cur: usize,
    end: usize,
}

impl ServerListCounter {
    fn new(list: &ServerList) -> Self {
        if list.servers.is_empty() {
            return ServerListCounter { cur: 0, end: 0 };
        }
        let start = list.start % list.servers.len();
        ServerListCounter {
            cur: start,
            end: start + list.servers.len(),
        }
    }

    /// Advances to the next server of the round.
    ///
    /// Returns `false` if the round is over.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = self.cur + 1;
        if next < self.end {
            self.cur = next;
            true
        } else {
            false
        }
    }

    pub fn info<'a>(&self, list: &'a ServerList) -> &'a ServerConf {
        &list[self.cur % list.servers.len()]
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::conf::Transport;
    use std::net::SocketAddr;

    fn conf() -> ResolvConf {
        let addrs: [SocketAddr; 3] = [
            "192.0.2.1:53".parse().unwrap(),
            "192.0.2.2:53".parse().unwrap(),
            "192.0.2.3:53".parse().unwrap(),
        ];
        ResolvConf::with_servers(addrs)
    }

    fn round(list: &ServerList, mut counter: ServerListCounter) -> Vec<u8> {
        let mut res = Vec::new();
        loop {
            match counter.info(list).addr {
                SocketAddr::V4(addr) => res.push(addr.ip().octets()[3]),
                SocketAddr::V6(_) => unreachable!(),
            }
            if !counter.next() {
                break;
            }
        }
        res
    }

    #[test]
    fn filtered_lists() {
        let conf = conf();
        let udp = ServerList::from_conf(&conf, |s| s.transport.is_preferred());
        let tcp = ServerList::from_conf(&conf, |s| s.transport.is_stream());
        assert_eq!(udp.len(), 3);
        assert_eq!(tcp.len(), 3);
        assert!(udp.iter().all(|s| s.transport == Transport::Udp));
        assert!(tcp.iter().all(|s| s.transport == Transport::Tcp));
    }

    #[test]
    fn plain_rounds() {
        let mut list =
            ServerList::from_conf(&conf(), |s| s.transport.is_preferred());
        let counter = list.counter(false);
        assert_eq!(round(&list, counter), [1, 2, 3]);
        let counter = list.counter(false);
        assert_eq!(round(&list, counter), [1, 2, 3]);
    }

    #[test]
    fn rotating_rounds() {
        let mut list =
            ServerList::from_conf(&conf(), |s| s.transport.is_preferred());
        let counter = list.counter(true);
        assert_eq!(round(&list, counter), [1, 2, 3]);
        let counter = list.counter(true);
        assert_eq!(round(&list, counter), [2, 3, 1]);
    }

    #[test]
    fn empty_list() {
        let mut list = ServerList::from_conf(&ResolvConf::new(), |_| true);
        assert!(list.is_empty());
        let mut counter = list.counter(true);
        assert!(!counter.next());
    }
}
