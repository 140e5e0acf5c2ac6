//! An event-loop driven DNS resolver.
//!
//! This crate resolves host names into addresses and looks up TXT records
//! without ever blocking the thread it runs on. It is built for a Tokio
//! current-thread runtime with a [`LocalSet`], where all resolver state
//! lives on a single thread.
//!
//! There are two ways to resolve names:
//!
//! * [`lookup`] and friends resolve host names into addresses through the
//!   system resolver, i.e., `getaddrinfo(3)`, which runs on Tokio’s
//!   blocking thread pool, and
//! * a [`Resolver`] sends TXT queries to the configured name servers using
//!   a non-blocking stub resolver engine whose sockets are polled by local
//!   tasks.
//!
//! Everything is created within an [`Env`]. When the environment tears
//! down, all resolvers are shut down and all lookups cancelled and the
//! teardown only completes once everything has released its resources.
//!
//! # Modules
//!
//! * [conf] contains the resolver configuration and its parser for the
//!   glibc `resolv.conf` format,
//! * [engine] contains the trait for stub resolver engines and the
//!   [`StubEngine`][engine::StubEngine] shipped with the crate,
//! * [resolver] contains the [`Resolver`] driving an engine,
//! * [lookup] contains address lookups,
//! * [teardown] contains the deferred teardown coordinator used by
//!   [`Env`], and
//! * [error] contains the error types.
//!
//! [`LocalSet`]: tokio::task::LocalSet
#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(unix))]
compile_error!("this crate only supports Unix platforms");

pub use self::env::Env;
pub use self::error::{LookupError, LookupErrorKind, ResolveError};
pub use self::lookup::{
    lookup, lookup_one, lookup_with, Family, LookupAddress, LookupOptions,
};
pub use self::resolver::Resolver;

pub mod conf;
pub mod engine;
pub mod env;
pub mod error;
pub mod lookup;
pub mod resolver;
pub mod teardown;
