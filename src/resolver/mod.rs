//! The event-loop driven resolver.
//!
//! A [`Resolver`] drives an [`Engine`] from within a Tokio `LocalSet`.
//! Whenever the engine reports interest in one of its sockets, the resolver
//! spawns a local task that polls the socket and feeds readiness back into
//! the engine. The engine’s timeouts are handled by another local task that
//! sleeps until the next deadline.
//!
//! Queries are submitted with [`Resolver::resolve_txt_with`], which takes a
//! continuation, or [`Resolver::resolve_txt`], which returns a future.
//!
//! A resolver is shut down either explicitly via [`Resolver::destroy`] or
//! when the [`Env`] it belongs to tears down. Shutting down closes all socket
//! tasks. Once the last one has gone, the engine is dropped and the
//! environment is told that the resolver is done. Queries still in flight
//! never complete: their continuations are dropped.
//!
//! # Example
//!
//! ```no_run
//! use domain_evresolv::{Env, Resolver};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let env = Env::new();
//! let resolver = Resolver::new(&env)?;
//! for record in resolver.resolve_txt("example.com").await? {
//!     println!("{}", record.join(""));
//! }
//! resolver.destroy();
//! env.teardown().await;
//! # Ok(())
//! # }
//! ```

pub use self::txt::{group_txt_chunks, TxtRecords};

use self::registry::TaskRegistry;
use self::txt::ResolveOperation;
use crate::conf::{self, ResolvConf};
use crate::engine::{
    Answer, Engine, EngineEvents, Interest, QueryToken, StubEngine,
};
use crate::env::Env;
use crate::error::ResolveError;
use crate::teardown::TeardownHandle;
use domain::base::iana::Rtype;
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::time::Instant;
use std::{fmt, io, mem};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

//------------ Sub-modules ---------------------------------------------------

mod registry;
mod socket;
mod txt;

//------------ Resolver ------------------------------------------------------

/// A resolver instance.
///
/// Values of this type are cheap handles to the shared resolver state and
/// can be cloned freely. All clones refer to the same resolver.
///
/// The resolver must only be used from within a Tokio `LocalSet` since it
/// spawns local tasks for its sockets and timeouts.
#[derive(Clone)]
pub struct Resolver {
    inner: Rc<RefCell<ResolverInner>>,
}

pub(crate) struct ResolverInner {
    /// The engine.
    ///
    /// This is `None` once the resolver has been finalized.
    engine: Option<Box<dyn Engine>>,

    /// The socket tasks.
    registry: TaskRegistry,

    /// The TXT queries in flight.
    operations: HashMap<QueryToken, ResolveOperation>,

    /// The token for the next query.
    next_token: u64,

    /// Is the resolver shutting down?
    exiting: bool,

    /// Our registration with the environment’s teardown.
    teardown: Option<TeardownHandle>,

    /// The task handling the engine’s timeouts.
    timer: Option<TimeoutDriver>,
}

/// # Creation and Destruction
///
impl Resolver {
    /// Creates a new resolver using the system’s configuration.
    ///
    /// The configuration is read from `/etc/resolv.conf` the first time any
    /// resolver is created.
    pub fn new(env: &Env) -> Result<Self, ResolveError> {
        Self::with_conf(env, conf::system_conf())
    }

    /// Creates a new resolver using the given configuration.
    pub fn with_conf(
        env: &Env,
        conf: &ResolvConf,
    ) -> Result<Self, ResolveError> {
        Self::with_engine(env, StubEngine::new(conf)?)
    }

    /// Creates a new resolver driving the given engine.
    ///
    /// Fails if the environment has already started tearing down.
    pub fn with_engine(
        env: &Env,
        engine: impl Engine + 'static,
    ) -> Result<Self, ResolveError> {
        let inner = Rc::new(RefCell::new(ResolverInner {
            engine: Some(Box::new(engine)),
            registry: TaskRegistry::new(),
            operations: HashMap::new(),
            next_token: 0,
            exiting: false,
            teardown: None,
            timer: None,
        }));
        let weak = Rc::downgrade(&inner);
        let handle = env
            .coordinator()
            .add(move || {
                if let Some(inner) = weak.upgrade() {
                    debug!("environment teardown, shutting down resolver");
                    Resolver { inner }.shutdown()
                }
            })
            .map_err(|_| ResolveError::Destruction)?;
        inner.borrow_mut().teardown = Some(handle);
        debug!("resolver created");
        Ok(Resolver { inner })
    }

    /// Destroys the resolver.
    ///
    /// All socket tasks are asked to close. Once they all have, the engine
    /// is dropped. Queries in flight will not complete. Destroying a
    /// resolver more than once is harmless.
    pub fn destroy(&self) {
        self.shutdown()
    }

    /// Returns whether the resolver has started shutting down.
    pub fn is_exiting(&self) -> bool {
        self.inner.borrow().exiting
    }

    /// Returns whether the resolver has been shut down completely.
    ///
    /// This is the case once the engine has been dropped.
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().engine.is_none()
    }

    /// Returns the number of socket tasks currently alive.
    pub fn active_sockets(&self) -> usize {
        self.inner.borrow().registry.len()
    }

    /// Returns the number of queries currently in flight.
    pub fn pending_queries(&self) -> usize {
        self.inner.borrow().operations.len()
    }

    fn shutdown(&self) {
        let leftovers = {
            let mut inner = self.inner.borrow_mut();
            if inner.exiting {
                return;
            }
            inner.exiting = true;
            debug!(
                sockets = inner.registry.len(),
                queries = inner.operations.len(),
                "shutting down resolver"
            );
            if inner.registry.is_empty() {
                Some(inner.finalize())
            } else {
                inner.registry.close_all();
                None
            }
        };
        if let Some(leftovers) = leftovers {
            leftovers.release()
        }
    }
}

/// # Queries
///
impl Resolver {
    /// Starts a TXT query for `name`.
    ///
    /// The continuation is called once the query has completed, unless the
    /// resolver shuts down before that. If the engine can finish the query
    /// right away, this happens before the method returns. It is never
    /// called if the method returns an error.
    pub fn resolve_txt_with<F>(
        &self,
        name: &str,
        callback: F,
    ) -> Result<(), ResolveError>
    where
        F: FnOnce(Result<TxtRecords, ResolveError>) + 'static,
    {
        let token = {
            let mut inner = self.inner.borrow_mut();
            if inner.exiting {
                return Err(ResolveError::Destruction);
            }
            let token = QueryToken::from_u64(inner.next_token);
            inner.next_token += 1;
            inner.operations.insert(
                token,
                ResolveOperation::new(
                    Rc::downgrade(&self.inner),
                    Box::new(callback),
                ),
            );
            token
        };
        trace!(%token, name, "submitting TXT query");
        let res = self.drive(|engine, events| {
            engine.submit(token, name, Rtype::TXT, events)
        });
        match res {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                let op = self.inner.borrow_mut().operations.remove(&token);
                drop(op);
                Err(err)
            }
            None => Err(ResolveError::Destruction),
        }
    }

    /// Resolves the TXT records for `name`.
    ///
    /// If the resolver shuts down while the query is in flight, the query
    /// fails with [`ResolveError::Cancelled`].
    pub async fn resolve_txt(
        &self,
        name: &str,
    ) -> Result<TxtRecords, ResolveError> {
        let (tx, rx) = oneshot::channel();
        self.resolve_txt_with(name, move |res| {
            let _ = tx.send(res);
        })?;
        rx.await.unwrap_or(Err(ResolveError::Cancelled))
    }
}

/// # Driving the Engine
///
impl Resolver {
    /// Runs an operation on the engine and processes its events.
    ///
    /// Returns `None` if the engine is already gone. Interest changes are
    /// applied while the engine runs. Completed queries are collected and
    /// their continuations are called after the engine is done.
    fn drive<R>(
        &self,
        op: impl FnOnce(&mut dyn Engine, &mut Dispatch) -> R,
    ) -> Option<R> {
        let (res, done) = {
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;
            let engine = inner.engine.as_deref_mut()?;
            let mut dispatch = Dispatch {
                resolver: self,
                registry: &mut inner.registry,
                exiting: inner.exiting,
                done: Vec::new(),
            };
            let res = op(engine, &mut dispatch);
            (res, dispatch.done)
        };
        self.complete(done);
        self.rearm_timer();
        Some(res)
    }

    /// Calls the continuations of completed queries.
    fn complete(
        &self,
        done: Vec<(QueryToken, Result<Answer, ResolveError>)>,
    ) {
        for (token, answer) in done {
            let op = self.inner.borrow_mut().operations.remove(&token);
            match op {
                Some(op) => {
                    trace!(%token, "query complete");
                    op.complete(answer)
                }
                None => error!(%token, "completion for unknown query"),
            }
        }
    }

    /// Processes readiness of a socket.
    fn process_readiness(&self, fd: RawFd, readable: bool, writable: bool) {
        if self.is_exiting() {
            return;
        }
        self.drive(|engine, events| {
            engine.process_fd(fd, readable, writable, events)
        });
    }

    /// Tells the engine that a socket could not be polled.
    fn socket_failed(&self, fd: RawFd, err: io::Error) {
        if self.is_exiting() {
            return;
        }
        self.drive(|engine, events| engine.process_fd_error(fd, err, events));
    }

    /// Processes expired timeouts.
    fn process_timeouts(&self) {
        if self.is_exiting() {
            return;
        }
        self.drive(|engine, events| {
            engine.process_timeouts(Instant::now(), events)
        });
    }

    /// Cleans up after a socket task has closed.
    fn socket_closed(&self, fd: RawFd, id: u64) {
        let leftovers = {
            let mut inner = self.inner.borrow_mut();
            if !inner.registry.remove(fd, id) {
                trace!(fd, id, "stale socket task closed");
            }
            if inner.exiting
                && inner.registry.is_empty()
                && inner.engine.is_some()
            {
                Some(inner.finalize())
            } else {
                None
            }
        };
        if let Some(leftovers) = leftovers {
            leftovers.release()
        }
    }

    /// Makes sure the timeout driver knows about the next deadline.
    fn rearm_timer(&self) {
        let notify = {
            let mut inner = self.inner.borrow_mut();
            if inner.exiting {
                return;
            }
            let notify =
                inner.timer.as_ref().map(|timer| timer.notify.clone());
            match notify {
                Some(notify) => notify,
                None => {
                    // The driver is only needed once there is a deadline.
                    if inner.next_timeout().is_some() {
                        let weak = Rc::downgrade(&self.inner);
                        inner.timer = Some(TimeoutDriver::spawn(weak));
                    }
                    return;
                }
            }
        };
        notify.notify_one();
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Resolver")
            .field("sockets", &inner.registry.len())
            .field("queries", &inner.operations.len())
            .field("exiting", &inner.exiting)
            .field("destroyed", &inner.engine.is_none())
            .finish()
    }
}

//------------ ResolverInner -------------------------------------------------

impl ResolverInner {
    /// Takes everything that needs releasing once the resolver is done.
    fn finalize(&mut self) -> Leftovers {
        debug_assert!(self.exiting && self.registry.is_empty());
        debug!("finalizing resolver");
        Leftovers {
            engine: self.engine.take(),
            operations: mem::take(&mut self.operations),
            timer: self.timer.take(),
            teardown: self.teardown.take(),
        }
    }

    fn next_timeout(&self) -> Option<Instant> {
        self.engine.as_ref().and_then(|engine| engine.next_timeout())
    }
}

//------------ Leftovers -----------------------------------------------------

/// Everything a finalized resolver releases.
///
/// This is released outside of the borrow of the resolver state since
/// dropping continuations may run arbitrary code.
struct Leftovers {
    engine: Option<Box<dyn Engine>>,
    operations: HashMap<QueryToken, ResolveOperation>,
    timer: Option<TimeoutDriver>,
    teardown: Option<TeardownHandle>,
}

impl Leftovers {
    fn release(self) {
        drop(self.engine);
        if !self.operations.is_empty() {
            debug!("dropping {} unfinished queries", self.operations.len());
        }
        drop(self.operations);
        drop(self.timer);
        if let Some(teardown) = self.teardown {
            teardown.finish()
        }
        debug!("resolver destroyed");
    }
}

//------------ Dispatch ------------------------------------------------------

/// The receiver of engine events for a resolver.
struct Dispatch<'a> {
    resolver: &'a Resolver,
    registry: &'a mut TaskRegistry,
    exiting: bool,
    done: Vec<(QueryToken, Result<Answer, ResolveError>)>,
}

impl<'a> EngineEvents for Dispatch<'a> {
    fn socket_state(&mut self, fd: RawFd, interest: Interest) {
        if self.exiting {
            return;
        }
        debug!(fd, %interest, "socket interest changed");
        match self.registry.get_mut(fd) {
            Some(task) => {
                if interest.is_none() {
                    if !task.close() {
                        trace!(fd, "socket task already closing");
                    }
                } else {
                    task.configure(interest);
                }
            }
            None => {
                if interest.is_none() {
                    return;
                }
                let (id, control) = self.registry.insert(fd, interest);
                socket::spawn(self.resolver.clone(), fd, id, control);
            }
        }
    }

    fn query_done(
        &mut self,
        token: QueryToken,
        answer: Result<Answer, ResolveError>,
    ) {
        self.done.push((token, answer))
    }
}

//------------ TimeoutDriver -------------------------------------------------

/// The task handling the engine’s timeouts.
struct TimeoutDriver {
    /// Notified when the next deadline may have changed.
    notify: Rc<Notify>,

    /// The handle of the task.
    handle: JoinHandle<()>,
}

impl TimeoutDriver {
    fn spawn(resolver: Weak<RefCell<ResolverInner>>) -> Self {
        let notify = Rc::new(Notify::new());
        let handle =
            tokio::task::spawn_local(Self::run(resolver, notify.clone()));
        TimeoutDriver { notify, handle }
    }

    async fn run(
        resolver: Weak<RefCell<ResolverInner>>,
        notify: Rc<Notify>,
    ) {
        loop {
            let Some(inner) = resolver.upgrade() else {
                return;
            };
            if inner.borrow().exiting {
                return;
            }
            let deadline = inner.borrow().next_timeout();
            drop(inner);

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline.into()) => {
                            let Some(inner) = resolver.upgrade() else {
                                return;
                            };
                            Resolver { inner }.process_timeouts();
                        }
                        _ = notify.notified() => { }
                    }
                }
                None => notify.notified().await,
            }
        }
    }
}

impl Drop for TimeoutDriver {
    fn drop(&mut self) {
        self.handle.abort()
    }
}
