//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Setup logging of events reported by the crate and the test suite.
///
/// Use the RUST_LOG environment variable to override the defaults.
///
/// E.g. To enable debug level logging:
///   RUST_LOG=DEBUG
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

/// Waits until `cond` becomes true.
///
/// Panics if that doesn’t happen within two seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

//------------ Wire Format ---------------------------------------------------

pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_SERVFAIL: u8 = 2;
pub const RCODE_NXDOMAIN: u8 = 3;

/// Creates a wire-format TXT query for `qname`.
pub fn txt_query(qname: &str, id: u16) -> Vec<u8> {
    let mut res = Vec::new();
    res.extend_from_slice(&id.to_be_bytes());
    res.extend_from_slice(&[0x01, 0x00]); // RD
    res.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
    for label in qname.split('.').filter(|label| !label.is_empty()) {
        res.push(label.len() as u8);
        res.extend_from_slice(label.as_bytes());
    }
    res.push(0);
    res.extend_from_slice(&[0, 16, 0, 1]);
    res
}

/// Creates the response to `query` containing the given TXT records.
///
/// The query must only have a single question and nothing else.
pub fn txt_response(
    query: &[u8],
    records: &[&[&str]],
    rcode: u8,
    truncated: bool,
) -> Vec<u8> {
    let mut res = Vec::new();
    res.extend_from_slice(&query[..2]);
    let mut flags = 0x80 | (query[2] & 0x01);
    if truncated {
        flags |= 0x02;
    }
    res.push(flags);
    res.push(0x80 | rcode);
    res.extend_from_slice(&[0, 1]);
    res.extend_from_slice(&(records.len() as u16).to_be_bytes());
    res.extend_from_slice(&[0, 0, 0, 0]);
    res.extend_from_slice(&query[12..]);
    for record in records {
        let mut rdata = Vec::new();
        for string in record.iter() {
            rdata.push(string.len() as u8);
            rdata.extend_from_slice(string.as_bytes());
        }
        res.extend_from_slice(&[0xC0, 0x0C, 0, 16, 0, 1, 0, 0, 0x0e, 0x10]);
        res.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        res.extend_from_slice(&rdata);
    }
    res
}
