//! Deferred teardown of the host environment.
//!
//! When the host environment wants to exit, every resource that owns
//! something asynchronous – sockets being polled, lookups running on the
//! blocking pool – has to release it first. Such a resource registers a
//! hook with the environment’s [`Teardown`] and keeps the returned
//! [`TeardownHandle`].
//!
//! Once teardown starts, all registered hooks are invoked. A hook asks its
//! resource to wind down; the resource finishes its handle once everything
//! has actually been released, which may well be much later. Teardown
//! completes when the last outstanding handle has been finished.
//!
//! A resource that is done before teardown starts simply finishes its
//! handle, which unregisters the hook.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::{error, fmt, mem};
use tokio::sync::Notify;
use tracing::{debug, trace};

//------------ Teardown ------------------------------------------------------

/// The deferred teardown coordinator of a host environment.
#[derive(Default)]
pub struct Teardown {
    /// The mutable state.
    state: RefCell<State>,

    /// Notified when the last pending handle has been finished.
    done: Notify,
}

#[derive(Default)]
struct State {
    /// The identifier for the next hook.
    next_id: u64,

    /// Hooks that haven’t been invoked yet, in registration order.
    hooks: Vec<(u64, Box<dyn FnOnce()>)>,

    /// Handles of invoked hooks that haven’t been finished yet.
    pending: Vec<u64>,

    /// Has teardown started?
    started: bool,
}

impl Teardown {
    /// Creates a new coordinator.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers a teardown hook.
    ///
    /// The hook will be called once teardown starts unless the returned
    /// handle is finished before that. Registration fails if teardown has
    /// already started.
    pub fn add(
        self: &Rc<Self>,
        hook: impl FnOnce() + 'static,
    ) -> Result<TeardownHandle, TeardownStarted> {
        let mut state = self.state.borrow_mut();
        if state.started {
            return Err(TeardownStarted);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.hooks.push((id, Box::new(hook)));
        trace!(id, "teardown hook registered");
        Ok(TeardownHandle {
            teardown: Rc::downgrade(self),
            id,
        })
    }

    /// Returns whether teardown has started.
    pub fn is_started(&self) -> bool {
        self.state.borrow().started
    }

    /// Returns the number of resources teardown is still waiting for.
    ///
    /// Before teardown has started, this is the number of registered hooks.
    pub fn outstanding(&self) -> usize {
        let state = self.state.borrow();
        state.hooks.len() + state.pending.len()
    }

    /// Runs teardown.
    ///
    /// Invokes all registered hooks, most recently registered first, and
    /// then waits until all their handles have been finished. Calling this
    /// again after teardown has started only waits.
    pub async fn run(&self) {
        let hooks = {
            let mut state = self.state.borrow_mut();
            if state.started {
                Vec::new()
            } else {
                state.started = true;
                let hooks = mem::take(&mut state.hooks);
                state.pending = hooks.iter().map(|(id, _)| *id).collect();
                hooks
            }
        };
        if !hooks.is_empty() {
            debug!("starting teardown of {} resources", hooks.len());
        }

        // Hooks may finish their handle right away which needs the state.
        for (id, hook) in hooks.into_iter().rev() {
            trace!(id, "running teardown hook");
            hook();
        }

        loop {
            let notified = self.done.notified();
            if self.state.borrow().pending.is_empty() {
                break;
            }
            notified.await;
        }
        debug!("teardown complete");
    }

    fn finish(&self, id: u64) {
        let hook = {
            let mut state = self.state.borrow_mut();
            if state.started {
                let before = state.pending.len();
                state.pending.retain(|item| *item != id);
                if before != state.pending.len() && state.pending.is_empty() {
                    self.done.notify_waiters();
                }
                None
            } else {
                state
                    .hooks
                    .iter()
                    .position(|(item, _)| *item == id)
                    .map(|pos| state.hooks.remove(pos))
            }
        };
        // An unused hook is dropped outside of the borrow.
        drop(hook);
        trace!(id, "teardown handle finished");
    }
}

//------------ TeardownHandle ------------------------------------------------

/// A registration with the teardown coordinator.
///
/// The handle must be finished once the resource has released everything.
/// Dropping the handle finishes it, too.
pub struct TeardownHandle {
    teardown: Weak<Teardown>,
    id: u64,
}

impl TeardownHandle {
    /// Signals that the resource has released everything.
    pub fn finish(self) {
        drop(self)
    }
}

impl Drop for TeardownHandle {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.upgrade() {
            teardown.finish(self.id)
        }
    }
}

impl fmt::Debug for TeardownHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TeardownHandle").field("id", &self.id).finish()
    }
}

//------------ TeardownStarted -----------------------------------------------

/// Teardown has already started and no new resources can be registered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TeardownStarted;

impl fmt::Display for TeardownStarted {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("teardown has already started")
    }
}

impl error::Error for TeardownStarted {}

//============ Testing =======================================================
