//! TXT queries.

use super::ResolverInner;
use crate::engine::{Answer, TxtChunk};
use crate::error::ResolveError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;
use tracing::debug;

//------------ TxtRecords ----------------------------------------------------

/// The result of a TXT query.
///
/// Each inner vector contains the character strings of one TXT record in
/// the order they appear in the record. The records are in the order they
/// appear in the answer.
pub type TxtRecords = Vec<Vec<String>>;

/// The continuation of a TXT query.
pub(super) type TxtCallback =
    Box<dyn FnOnce(Result<TxtRecords, ResolveError>)>;

//------------ ResolveOperation ----------------------------------------------

/// A TXT query in flight.
pub(super) struct ResolveOperation {
    /// The resolver the query was submitted to.
    resolver: Weak<RefCell<ResolverInner>>,

    /// The continuation.
    callback: TxtCallback,
}

impl ResolveOperation {
    pub fn new(
        resolver: Weak<RefCell<ResolverInner>>,
        callback: TxtCallback,
    ) -> Self {
        ResolveOperation { resolver, callback }
    }

    /// Completes the operation with the engine’s result.
    ///
    /// If the resolver is already exiting, the continuation is dropped
    /// without being called.
    pub fn complete(self, answer: Result<Answer, ResolveError>) {
        let exiting = match self.resolver.upgrade() {
            Some(inner) => inner.borrow().exiting,
            None => true,
        };
        if exiting {
            debug!("resolver exiting, dropping TXT result");
            return;
        }
        let res = answer
            .and_then(|answer| answer.txt_chunks())
            .map(group_txt_chunks);
        (self.callback)(res)
    }
}

impl fmt::Debug for ResolveOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolveOperation").finish_non_exhaustive()
    }
}

//------------ group_txt_chunks ----------------------------------------------

/// Groups TXT chunks into records.
///
/// A chunk starting a record opens a new record, all other chunks are added
/// to the most recent record. If the very first chunk doesn’t start a
/// record, it opens one anyway.
pub fn group_txt_chunks(
    chunks: impl IntoIterator<Item = TxtChunk>,
) -> TxtRecords {
    let mut res: TxtRecords = Vec::new();
    for chunk in chunks {
        let data = String::from_utf8_lossy(&chunk.data).into_owned();
        match res.last_mut() {
            Some(record) if !chunk.record_start => record.push(data),
            _ => res.push(vec![data]),
        }
    }
    res
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    fn chunk(data: &'static str, record_start: bool) -> TxtChunk {
        TxtChunk {
            data: Bytes::from_static(data.as_bytes()),
            record_start,
        }
    }

    #[test]
    fn grouping() {
        let records = group_txt_chunks([
            chunk("chunk1a", true),
            chunk("chunk1b", false),
            chunk("chunk2", true),
        ]);
        assert_eq!(records, [vec!["chunk1a", "chunk1b"], vec!["chunk2"]]);
    }

    #[test]
    fn leading_continuation() {
        let records =
            group_txt_chunks([chunk("a", false), chunk("b", false)]);
        assert_eq!(records, [vec!["a", "b"]]);
    }

    #[test]
    fn empty() {
        assert!(group_txt_chunks(Vec::new()).is_empty());
    }

    #[test]
    fn lossy_conversion() {
        let records = group_txt_chunks([TxtChunk {
            data: Bytes::from_static(b"a\xffb"),
            record_start: true,
        }]);
        assert_eq!(records, [vec!["a\u{fffd}b"]]);
    }
}
