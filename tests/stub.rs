//! Tests for the stub engine against a local server.

mod common;

use common::{
    init_logging, txt_response, RCODE_NOERROR, RCODE_NXDOMAIN, RCODE_SERVFAIL,
};
use domain_evresolv::conf::ResolvConf;
use domain_evresolv::{Env, ResolveError, Resolver};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::LocalSet;

//------------ Server --------------------------------------------------------

/// How the UDP side of the test server responds.
#[derive(Clone, Copy)]
enum Udp {
    /// Respond with the records and the given rcode.
    Answer(u8),

    /// Respond with an empty, truncated answer.
    Truncated,

    /// Never respond.
    Silent,

    /// Ignore the first query and answer all others with the records.
    DropFirst,
}

const RECORDS: &[&[&str]] = &[&["hello", "world"], &["second"]];

/// Starts the server on a local port and returns a configuration for it.
async fn start_server(udp: Udp) -> ResolvConf {
    conf_for(spawn_server(udp).await, Duration::from_secs(2))
}

/// Starts the server on a local port and returns its address.
async fn spawn_server(udp: Udp) -> SocketAddr {
    let tcp_sock = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp_sock.local_addr().unwrap();
    let udp_sock = UdpSocket::bind(addr).await.unwrap();

    tokio::task::spawn_local(async move {
        let mut buf = vec![0u8; 2048];
        let mut count = 0;
        loop {
            let (len, peer) = udp_sock.recv_from(&mut buf).await.unwrap();
            let query = &buf[..len];
            count += 1;
            let response = match udp {
                Udp::Answer(rcode) => {
                    let records = if rcode == RCODE_NOERROR {
                        RECORDS
                    } else {
                        &[]
                    };
                    txt_response(query, records, rcode, false)
                }
                Udp::Truncated => txt_response(query, &[], 0, true),
                Udp::Silent => continue,
                Udp::DropFirst if count == 1 => continue,
                Udp::DropFirst => txt_response(query, RECORDS, 0, false),
            };
            udp_sock.send_to(&response, peer).await.unwrap();
        }
    });

    tokio::task::spawn_local(async move {
        loop {
            let (mut stream, _) = tcp_sock.accept().await.unwrap();
            let mut len = [0u8; 2];
            stream.read_exact(&mut len).await.unwrap();
            let mut query = vec![0u8; usize::from(u16::from_be_bytes(len))];
            stream.read_exact(&mut query).await.unwrap();
            let response = txt_response(&query, RECORDS, 0, false);
            let len = (response.len() as u16).to_be_bytes();
            stream.write_all(&len).await.unwrap();
            stream.write_all(&response).await.unwrap();
        }
    });

    addr
}

fn conf_for(addr: SocketAddr, timeout: Duration) -> ResolvConf {
    let mut conf = ResolvConf::with_servers([addr]);
    conf.options.timeout = timeout;
    conf.options.attempts = 1;
    conf.finalize();
    conf
}

fn expected() -> Vec<Vec<String>> {
    RECORDS
        .iter()
        .map(|record| record.iter().map(ToString::to_string).collect())
        .collect()
}

//------------ Tests ---------------------------------------------------------

#[tokio::test]
async fn udp_answer() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let conf = start_server(Udp::Answer(RCODE_NOERROR)).await;
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let res = resolver.resolve_txt("example.com").await.unwrap();
            assert_eq!(res, expected());
            env.teardown().await;
            assert!(resolver.is_destroyed());
        })
        .await;
}

#[tokio::test]
async fn truncated_answer_uses_tcp() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let conf = start_server(Udp::Truncated).await;
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let res = resolver.resolve_txt("example.com").await.unwrap();
            assert_eq!(res, expected());
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn tcp_only() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let mut conf = start_server(Udp::Silent).await;
            conf.options.use_vc = true;
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let res = resolver.resolve_txt("example.com").await.unwrap();
            assert_eq!(res, expected());
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn nxdomain() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let conf = start_server(Udp::Answer(RCODE_NXDOMAIN)).await;
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let err = resolver.resolve_txt("nope.example").await.unwrap_err();
            assert_eq!(err, ResolveError::NotFound);
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn servfail() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let conf = start_server(Udp::Answer(RCODE_SERVFAIL)).await;
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let err = resolver.resolve_txt("example.com").await.unwrap_err();
            assert_eq!(err, ResolveError::ServFail);
            assert_eq!(err.code(), "ESERVFAIL");
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn timeout() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let mut conf = start_server(Udp::Silent).await;
            conf.options.timeout = Duration::from_millis(200);
            conf.finalize();
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let start = Instant::now();
            let err = resolver.resolve_txt("example.com").await.unwrap_err();
            assert_eq!(err, ResolveError::Timeout);
            assert!(start.elapsed() >= Duration::from_millis(200));
            assert_eq!(
                err.to_string(),
                "Timeout while contacting DNS servers"
            );
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn retry_after_timeout() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let mut conf = start_server(Udp::DropFirst).await;
            conf.options.timeout = Duration::from_millis(300);
            conf.options.attempts = 2;
            conf.finalize();
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let start = Instant::now();
            let res = resolver.resolve_txt("example.com").await.unwrap();
            assert_eq!(res, expected());
            assert!(start.elapsed() >= Duration::from_millis(300));
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn next_server_after_servfail() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let failing = spawn_server(Udp::Answer(RCODE_SERVFAIL)).await;
            let working = spawn_server(Udp::Answer(RCODE_NOERROR)).await;
            let mut conf = ResolvConf::with_servers([failing, working]);
            conf.options.attempts = 1;
            conf.finalize();
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let res = resolver.resolve_txt("example.com").await.unwrap();
            assert_eq!(res, expected());
            env.teardown().await;
        })
        .await;
}

#[tokio::test]
async fn bad_name() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let env = Env::new();
            let conf = conf_for(
                "127.0.0.1:53".parse().unwrap(),
                Duration::from_secs(1),
            );
            let resolver = Resolver::with_conf(&env, &conf).unwrap();
            let name = "a".repeat(64);
            assert_eq!(
                resolver.resolve_txt(&name).await.unwrap_err(),
                ResolveError::BadName
            );
            assert_eq!(resolver.active_sockets(), 0);
            resolver.destroy();
            assert!(resolver.is_destroyed());
        })
        .await;
}

#[test]
fn no_servers() {
    let env = Env::new();
    assert_eq!(
        Resolver::with_conf(&env, &ResolvConf::new()).unwrap_err(),
        ResolveError::NoServer
    );
}
